//! # Swasthya知情同意模块
//!
//! 访问病历前向患者登记手机发送一次性验证码，并校验医生转述的验证码。

pub mod code;
pub mod delivery;
pub mod gate;

pub use code::{CodeGenerator, FixedCodeGenerator, RandomCodeGenerator};
pub use delivery::{CodeDelivery, ConsoleDelivery, DeliveredCode, OutboxDelivery};
pub use gate::{ConsentChallenge, ConsentGate, ConsentPolicy, ConsentStatus};
