pub mod item;

pub use item::{Item, NO_DUE_DATE, NewItemRequest, UpdateItemRequest, format_due_date};
