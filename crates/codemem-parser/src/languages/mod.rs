pub mod css;
pub mod ecma;
pub mod html;
pub mod json;
pub mod python;
pub mod util;
pub mod yaml;

pub use css::CssParser;
pub use ecma::{EcmaDialect, EcmaParser};
pub use html::HtmlParser;
pub use json::JsonParser;
pub use python::PythonParser;
pub use yaml::YamlParser;
