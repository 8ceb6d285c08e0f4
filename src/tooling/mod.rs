use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::SystemTime;
use tauri::AppHandle;
use url::Url;
use zip::ZipArchive;

mod commands;
mod download;
mod encode;
mod install;
mod jobs;
mod media;
mod runtime;

use download::*;
use encode::*;
use install::*;
use jobs::*;
use media::*;
use runtime::*;

pub use commands::*;
