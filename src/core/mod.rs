pub mod cluster;
pub mod dsp;
pub mod features;
pub mod masking;
pub mod reconstruct;
