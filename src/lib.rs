pub mod allocator {
    pub mod image_sets;
    pub mod slots;
}
pub mod config;
pub mod domain {
    pub mod content;
    pub mod error;
    pub mod experiment;
}
pub mod publisher;
pub mod scorer;
pub mod selection {
    pub mod winner;
}
pub mod service {
    pub mod experiment_service;
    pub mod rotation_scheduler;
}
pub mod store;
