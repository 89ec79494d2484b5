//! Output generation for scrape runs.
//!
//! This module contains submodules responsible for writing run artifacts:
//!
//! # Submodules
//!
//! - [`json`]: Writes and reads per-story JSON files
//! - [`summary`]: Writes `summary.json` and `links_used.txt`
//!
//! # Output Structure
//!
//! ```text
//! ss_scrape_2025-05-06_083015PM/
//! ├── links_used.txt
//! ├── summary.json
//! └── output/
//!     ├── A_Journey_of_Strength.json
//!     ├── story_2.json
//!     └── images/
//!         └── A_Journey_of_Strength.jpg
//! ```

pub mod json;
pub mod summary;
