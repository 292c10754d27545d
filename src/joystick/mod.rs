pub mod channel;
pub mod store;

pub use channel::{scale_axis, scale_button, Channel};
pub use store::{JoystickError, JoystickStore, MAX_CONTROLLERS, NEUTRAL_BLOCK};
