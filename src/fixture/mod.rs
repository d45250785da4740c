pub mod netlinks;
pub mod recorder;
