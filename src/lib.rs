pub mod color;
pub mod config;
pub mod play;
pub mod preview;
pub mod scene;
pub mod server;
pub mod strip;

pub mod prelude {
    pub use crate::{color::*, config::*, play::*, preview::*, scene::*, server::*, strip::*};

    pub use crate::play::runner::*;
    pub use crate::scene::cache::*;
    pub use crate::strip::simulator::*;
}
