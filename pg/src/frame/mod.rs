pub mod preprocess;
pub mod frame_history;
pub mod state;
