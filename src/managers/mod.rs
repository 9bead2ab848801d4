pub mod hosts;
pub mod session;
pub mod stream;
pub mod transfer;
