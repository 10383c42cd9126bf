pub mod api;
pub mod ast;
pub mod error;
pub mod graph;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod serialization;
pub mod synthesizer;
pub mod utils;
pub mod wiring;

pub use api::{
    analyze, export_config, load_config, parse, parse_strict, save_config, AnalysisResult,
};
pub use ast::{Argument, Block, DocumentNode};
pub use error::AlloyError;
pub use graph::{ArgumentPath, Edge, Graph};
pub use schema::SchemaRegistry;
pub use serialization::to_config_string;
