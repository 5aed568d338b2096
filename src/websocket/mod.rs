pub mod dispatcher;
pub mod notifications;
pub mod registry;
