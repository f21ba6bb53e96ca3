//! attend-store: persistent enrollment data.
//!
//! Students and their face encodings live in one SQLite file. The store is
//! also the production [`attend_core::GallerySource`].

pub mod store;

pub use store::{Enrolled, Student, Store, StoreError};
