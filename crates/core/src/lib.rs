#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

//! Core library for the snipper CLI.
//!
//! `snipper_core` provides:
//! - the editor preference and execution store via [`editor`]
//! - the remote execution client and response classification via [`providers`]
//! - the language to runtime table via [`languages`]
//! - key/value persistence for preferences and drafts via [`storage`]
//! - the snippet backend contract via [`schema`] and its local implementation via [`backend`]
//! - the interactive terminal editor via [`repl`]
//! - shared configuration and result types via [`types`]
//!
//! # Quick Start
//!
//! ```no_run
//! use snipper_core::editor::{EditorStore, TextBuffer};
//! use snipper_core::providers::PistonProvider;
//! use snipper_core::storage::FileStore;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = PistonProvider::new("https://emkc.org/api/v2/piston/execute", 30_000)?;
//! let storage = FileStore::open(".snipper/preferences.json")?;
//! let mut store = EditorStore::new(provider, storage);
//! store.set_language("python")?;
//! store.attach_editor(TextBuffer::new("print('hello')"));
//! store.run().await;
//! match store.error() {
//!     Some(error) => eprintln!("{error}"),
//!     None => println!("{}", store.output()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod editor;
pub mod languages;
pub mod providers;
pub mod repl;
pub mod schema;
pub mod storage;
pub mod types;
