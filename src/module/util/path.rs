//! Path Operations Module
//!
//! This module handles path operations for directories and files.

use std::path::PathBuf;

/// Join Paths
///
/// This function takes a slice of strings as input and joins them into a single path string.
/// It uses the PathBuf type to handle platform-specific separators and conversions.
/// Non UTF-8 components are replaced lossily.
pub fn join(paths: &[&str]) -> String {
    let mut path: PathBuf = PathBuf::new();
    for p in paths {
        path.push(p);
    }
    path.to_string_lossy().into_owned()
}

pub mod dir {
    //! Directory Operations Submodule
    //!
    //! This submodule provides functions for directory operations.

    use std::fs;
    use std::io;
    use std::path::Path;

    use super::{WeedtrackDir, WeedtrackImg, WeedtrackPath};
    use crate::module::define;

    /// Create Directory from Path List
    ///
    /// This function takes a slice of strings as input and creates a directory with the joined path.
    /// It returns the created path.
    pub fn create_dir_from_path_list(paths: &[&str]) -> io::Result<String> {
        let path = super::join(paths);
        fs::create_dir_all(Path::new(&path))?;
        Ok(path)
    }

    /// Create Subdirectory in Either Directory
    ///
    /// Creates `name` under `dir1` when `dir1` exists, otherwise under `dir2`.
    pub fn create_subdir_in_either_dir(dir1: &str, dir2: &str, name: &str) -> io::Result<String> {
        let parent: &str = match Path::new(dir1).is_dir() {
            true => dir1,
            false => dir2,
        };
        create_dir_from_path_list(&[parent, name])
    }

    /// Create Application Subdirectory and Paths
    ///
    /// The data directory lives under `define::path::PERSISTENT_DIR` when it exists and under
    /// `define::path::EPHEMERAL_DIR` otherwise. Image and log subdirectories are created
    /// inside it; the live overlay frame goes to the ephemeral directory.
    pub fn create_app_sub_dir() -> io::Result<WeedtrackPath> {
        create_app_sub_dir_in(define::path::PERSISTENT_DIR, define::path::EPHEMERAL_DIR)
    }

    /// Same as [`create_app_sub_dir`] with explicit parent directories.
    pub fn create_app_sub_dir_in(persistent: &str, ephemeral: &str) -> io::Result<WeedtrackPath> {
        let data_dir =
            create_subdir_in_either_dir(persistent, ephemeral, define::system::NAME)?;
        let tmp_dir = create_dir_from_path_list(&[ephemeral, define::system::NAME])?;
        let img_dir = create_dir_from_path_list(&[&data_dir, define::path::IMG_DIR])?;
        let log_dir = create_dir_from_path_list(&[&data_dir, define::path::LOG_DIR])?;
        let live_img = super::join(&[&tmp_dir, define::path::LIVE_IMAGE]);
        Ok(WeedtrackPath {
            dir: WeedtrackDir {
                data: data_dir,
                img: img_dir,
                log: log_dir,
            },
            img: WeedtrackImg { live: live_img },
        })
    }
}

/// Paths of Resources
///
/// This struct represents the paths of the resources used by the application.
#[derive(Debug, Clone)]
pub struct WeedtrackPath {
    /// Directories Paths
    pub dir: WeedtrackDir,
    /// Images Paths
    pub img: WeedtrackImg,
}

/// Paths of Directories
#[derive(Debug, Clone)]
pub struct WeedtrackDir {
    /// Data Directory Path
    pub data: String,
    /// Annotated Image Directory Path
    pub img: String,
    /// Log Directory Path
    pub log: String,
}

/// Paths of Images
#[derive(Debug, Clone)]
pub struct WeedtrackImg {
    /// Last live overlay frame
    pub live: String,
}
