pub use super::contact::Entity as Contact;
pub use super::deal::Entity as Deal;
pub use super::event::Entity as Event;
pub use super::message::Entity as Message;
pub use super::pipeline::Entity as Pipeline;
pub use super::task::Entity as Task;
pub use super::task_type::Entity as TaskType;
pub use super::user::Entity as User;
