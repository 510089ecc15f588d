pub mod ast;
pub mod canonical;
pub mod context;
pub mod document;
pub mod error;
pub mod functions;
pub mod interpret;
pub mod lower;
pub mod parser;
pub mod registry;
pub mod rule;
pub mod table;
pub mod unparse;


pub use canonical::Document;
pub use context::{Bindings, Commit, Context, Output};
pub use error::{Error, ExecutionError, ParseError};
pub use interpret::{compile, interpret};
pub use parser::{parse, parse_buffer, parse_statement};
pub use registry::{Connector, DirectoryConnector, MemoryRegistry, RegistryClient};
pub use rule::Rule;
pub use unparse::{unparse, unparse_action};
