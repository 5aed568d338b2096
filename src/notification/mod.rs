pub mod controller;
pub mod model;
pub mod service;
pub mod store;
pub mod view;
