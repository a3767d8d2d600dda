pub mod scheduler;
pub mod todo_service;

pub use scheduler::ReminderScheduler;
pub use todo_service::TodoService;
