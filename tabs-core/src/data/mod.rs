mod nav;
mod playlist;
mod tab;
pub mod utils;

pub use crate::data::{
    nav::{Nav, PlaylistContext},
    playlist::{EntryId, Playlist, PlaylistEntry, PlaylistId},
    tab::{Tab, TabDetail},
};
