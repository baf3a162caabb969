//! 크롤링한 Discovery로 테스트 플랜을 만들고, 여러 프레임워크 코드로 렌더링해
//! 큐 기반 워커에서 실행하는 라이브러리이다.

pub mod adapters;
pub mod compiler;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod executor;
pub mod patterns;
pub mod scenario;
pub mod synthesis;
