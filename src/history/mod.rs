use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tauri::{AppHandle, Manager};

mod commands;
mod database;
mod types;

use database::*;
use types::*;

pub use commands::*;
pub(crate) use types::NewRenderEntry;
