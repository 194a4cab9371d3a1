//! 릴레이 도메인 모델.

pub mod account;
pub mod intent;
pub mod market;
pub mod outcome;
pub mod sizing;

pub use account::*;
pub use intent::*;
pub use market::*;
pub use outcome::*;
pub use sizing::*;
