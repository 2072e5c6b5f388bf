/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Tag-based template engine with automatic output escaping.
//!
//! Templates are markup with two kinds of dynamic parts:
//!
//! - Expressions in braces: `{user.name}`, `{count + 1}`,
//!   `{admin ? 'yes' : 'no'}`, `{value as integer}`, and inline ViewHelper
//!   chains such as `{text -> f:format.raw()}`
//! - ViewHelper tags in a bound namespace: `<f:if condition="{admin}">`,
//!   `<f:for each="{items}" as="item">`
//!
//! Everything else is passed through verbatim. Expression output is
//! HTML-escaped unless a helper turns escaping off for its children.
//!
//! # Architecture
//!
//! Source is split by the [`lexer`] and turned into a [`SyntaxTree`] by the
//! [`parser`], with the escaping [`interceptor`] wrapping output nodes as they
//! are created. A [`ParsedTemplate`] can be rendered directly (see
//! [`evaluator`]) or lowered by the [`compiler`] into a serializable
//! [`CompiledTemplate`] that is cached under a stable identifier. The
//! [`TemplateEngine`] picks between the two.
//!
//! # Example
//!
//! ```ignore
//! use stencil::{StandardVariableProvider, TemplateEngine, Value, VariableProvider};
//!
//! let engine = TemplateEngine::new();
//! let mut variables = StandardVariableProvider::new();
//! variables.add("name", Value::from("<World>"));
//!
//! let mut ctx = engine.context(variables);
//! let output = engine.render("hello.html", "Hello {name}!", &mut ctx)?;
//! assert_eq!(output, "Hello &lt;World&gt;!");
//! ```

pub mod arguments;
pub mod ast;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod error_handler;
pub mod evaluator;
pub mod expression;
pub mod helper;
pub mod helpers;
pub mod interceptor;
pub mod invocation;
pub mod lexer;
pub mod namespace;
pub mod parser;
pub mod resolver;
pub mod source;
pub mod value;
pub mod variables;

// Re-export main types at crate root
pub use arguments::{ArgumentCollection, ArgumentValue};
pub use ast::{CompileState, Node, NodeId, ParsedTemplate, SyntaxTree};
pub use cache::{FileSystemCache, MemoryCache, NullCache, TemplateCache};
pub use compiler::{
    CompilationResult, CompiledTemplate, FileSystemTemplateLocator, MemoryTemplateLocator,
    TemplateCompiler, TemplateEntry, TemplateKind, TemplateLocator, WarmupResult,
};
pub use config::EngineConfig;
pub use context::RenderingContext;
pub use engine::TemplateEngine;
pub use error::{
    CacheError, CompileError, ConfigError, ExpressionError, LexError, ParseError, TemplateError,
    TemplateResult, ViewHelperError,
};
pub use error_handler::{ErrorHandler, StandardErrorHandler, TolerantErrorHandler};
pub use expression::{CustomExpression, ExpressionRecognizer};
pub use helper::{
    ArgumentDefinition, ArgumentType, ChildKind, ChildNodeAccess, CompileMode, HelperKey,
    ViewHelper,
};
pub use interceptor::{Interceptor, InterceptorChain};
pub use invocation::Invocation;
pub use namespace::{CORE_NAMESPACE, NamespaceTable};
pub use parser::{ParserConfiguration, ParsingState, TemplateParser};
pub use resolver::{StandardViewHelperResolver, ViewHelperResolver};
pub use source::SourceLocation;
pub use value::{Scalar, TemplateObject, Value, ValueMap};
pub use variables::{StandardVariableProvider, VariableProvider};
