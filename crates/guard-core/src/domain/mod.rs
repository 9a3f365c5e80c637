//! 리스크 관리 코어의 도메인 모델.

mod credential;
mod execution;
mod position;
mod session;

pub use credential::*;
pub use execution::*;
pub use position::*;
pub use session::*;
