pub mod delegate;
pub mod face_crop;
pub mod processors;
pub mod queue;
pub mod scheduler;
