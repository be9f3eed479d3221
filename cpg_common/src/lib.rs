mod helpers;
mod money;
pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use money::{Money, MoneyConversionError, MDL_CURRENCY_CODE, MDL_CURRENCY_CODE_LOWER};
pub use secret::Secret;
