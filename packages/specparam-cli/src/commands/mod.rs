pub mod discover;
pub mod fit;
pub mod psd;
pub mod run;
pub mod simulate;
