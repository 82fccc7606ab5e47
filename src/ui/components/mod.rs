//! Overlay and input widgets shared by the views.

mod command_input;
mod form;
mod input;
mod picker;

pub use command_input::{CommandEvent, CommandInput};
pub use form::{Form, FormEvent, FormValues};
pub use input::{InputResult, TextInput};
pub use picker::{Picker, PickerEvent};

/// What a component did with a key, so its owner knows whether to keep
/// dispatching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Used up, nothing for the owner to do
  Handled,
  /// Used up, and the owner has something to act on
  Event(T),
  /// Not this component's key
  NotHandled,
}
