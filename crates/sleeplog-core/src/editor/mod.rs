//! Interactive timeline editor.
//!
//! The gesture translator runs on the interaction thread and writes
//! [`LiveCoordinates`]; the renderer reads them every frame. Completed
//! gestures reach the [`EditController`] as [`EditorCommand`]s, and only the
//! controller talks to the store.

mod command;
mod controller;
mod coords;
mod gesture;
mod live;
mod session;

pub use command::EditorCommand;
pub use controller::{EditController, EventSender};
pub use coords::{Handle, HandlePosition, SessionCoordinates};
pub use gesture::{ColumnGeometry, DragTarget, GestureTranslator, LongPress, TapRecognizer};
pub use live::{CommitGuard, LiveCoordinates};
pub use session::{EditPhase, EditSession};
