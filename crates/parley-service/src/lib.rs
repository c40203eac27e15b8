pub mod dispatcher;
pub mod error;
pub mod messenger;

pub use dispatcher::EventBus;
pub use error::{ServiceError, ServiceResult};
pub use messenger::Messenger;
