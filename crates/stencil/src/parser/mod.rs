/*
 * parser/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! A single pass over the token stream with an explicit stack of open
//! ViewHelper tags. Every node the parser creates or closes goes through the
//! configured [`InterceptorChain`]; the node the chain returns is what ends up
//! in the tree.
//!
//! ViewHelper arguments are parsed into separate sub-trees (each under its own
//! parentless root) and are never intercepted.

mod inline;
mod state;

pub use state::{EscapingState, ParsingState};

use crate::arguments::{ArgumentCollection, ArgumentValue, BindError};
use crate::ast::{BodyFragment, Node, NodeId, ParsedTemplate, ViewHelperNode};
use crate::context::RenderingContext;
use crate::error::{ExpressionError, LexError, ParseError, TemplateError, TemplateResult};
use crate::error_handler::{ErrorHandler, StandardErrorHandler};
use crate::expression::{
    BareWords, BooleanExpression, Expression, ExpressionRecognizer, Operand, OperandBuilder,
    RawOperand, classify_operand, default_recognizers, scan,
};
use crate::helper::{ArgumentType, ChildNodeInfo, CompileMode, HelperKey};
use crate::interceptor::{EscapeInterceptor, InterceptionPoint, Interceptor, InterceptorChain};
use crate::lexer::{Lexer, LexerOptions, Token, TokenKind, cdata_content, parse_tag};
use crate::namespace::{DEFAULT_NAMESPACE_URI_PREFIX, NamespaceTable, target_from_uri};
use crate::resolver::{StandardViewHelperResolver, ViewHelperResolver};
use crate::value::{Scalar, Value};
use inline::{InlineCall, InlineChain, InlineValue};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

static NAMESPACE_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^namespace\s+([A-Za-z][A-Za-z0-9_-]*\*?)\s*(?:=\s*([A-Za-z_][A-Za-z0-9_:]*))?$")
        .expect("namespace directive pattern is valid")
});

static SWITCH_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(escaping|parsing)\s+(on|off|true|false)$").expect("switch pattern is valid")
});

static NAMESPACE_DECLARATIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{namespace\s+([A-Za-z][A-Za-z0-9_-]*)(\*?)\s*(=\s*[^\s}]+)?\s*\}")
        .expect("namespace declaration pattern is valid")
});

static XMLNS_ATTRIBUTES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\sxmlns:([A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("xmlns pattern is valid")
});

static ESCAPING_OFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{escaping\s+(?:off|false)\s*\}").expect("escaping pattern is valid")
});

static PARSING_OFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{parsing\s+(?:off|false)\s*\}").expect("parsing pattern is valid")
});

/// Settings shared by every parse.
#[derive(Clone)]
pub struct ParserConfiguration {
    recognizers: Vec<Arc<dyn ExpressionRecognizer>>,
    interceptors: InterceptorChain,
    escaping: bool,
    namespace_uri_prefix: String,
    lexer: LexerOptions,
}

impl fmt::Debug for ParserConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recognizers: Vec<&str> = self.recognizers.iter().map(|r| r.name()).collect();
        f.debug_struct("ParserConfiguration")
            .field("recognizers", &recognizers)
            .field("interceptors", &self.interceptors)
            .field("escaping", &self.escaping)
            .field("namespace_uri_prefix", &self.namespace_uri_prefix)
            .finish_non_exhaustive()
    }
}

impl Default for ParserConfiguration {
    fn default() -> Self {
        let mut interceptors = InterceptorChain::new();
        interceptors.push(Arc::new(EscapeInterceptor));
        Self {
            recognizers: default_recognizers(),
            interceptors,
            escaping: true,
            namespace_uri_prefix: DEFAULT_NAMESPACE_URI_PREFIX.to_string(),
            lexer: LexerOptions::default(),
        }
    }
}

impl ParserConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recognizer after the existing ones.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn ExpressionRecognizer>) -> Self {
        self.recognizers.push(recognizer);
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_escaping(mut self, enabled: bool) -> Self {
        self.escaping = enabled;
        self
    }

    pub fn with_namespace_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_uri_prefix = prefix.into();
        self
    }

    pub fn with_lexer_options(mut self, options: LexerOptions) -> Self {
        self.lexer = options;
        self
    }

    pub fn recognizers(&self) -> &[Arc<dyn ExpressionRecognizer>] {
        &self.recognizers
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    pub fn escaping(&self) -> bool {
        self.escaping
    }

    pub fn namespace_uri_prefix(&self) -> &str {
        &self.namespace_uri_prefix
    }

    /// Settings that change what a parse produces for the same source.
    pub fn fingerprint(&self) -> String {
        let recognizers: Vec<&str> = self.recognizers.iter().map(|r| r.name()).collect();
        format!(
            "escaping={};recognizers={};interceptors={};uri={};tags={}",
            self.escaping,
            recognizers.join(","),
            self.interceptors.len(),
            self.namespace_uri_prefix,
            self.lexer.tag_pattern()
        )
    }
}

/// Turns template source into a [`ParsedTemplate`].
#[derive(Clone)]
pub struct TemplateParser {
    config: Arc<ParserConfiguration>,
    resolver: Arc<dyn ViewHelperResolver>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl fmt::Debug for TemplateParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateParser")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for TemplateParser {
    fn default() -> Self {
        Self::new(
            Arc::new(ParserConfiguration::default()),
            Arc::new(StandardViewHelperResolver::new()),
            Arc::new(StandardErrorHandler),
        )
    }
}

impl TemplateParser {
    pub fn new(
        config: Arc<ParserConfiguration>,
        resolver: Arc<dyn ViewHelperResolver>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            config,
            resolver,
            error_handler,
        }
    }

    /// A parser using the configuration, resolver and error handler of a
    /// rendering context.
    pub fn from_context(ctx: &RenderingContext) -> Self {
        Self::new(
            Arc::clone(ctx.parser_configuration()),
            Arc::clone(ctx.resolver()),
            Arc::clone(ctx.error_handler()),
        )
    }

    pub fn configuration(&self) -> &ParserConfiguration {
        &self.config
    }

    /// Bindings every template starts with.
    pub fn namespaces(&self) -> NamespaceTable {
        self.resolver.namespaces()
    }

    pub fn parse(&self, source: &str, identifier: &str) -> TemplateResult<ParsedTemplate> {
        self.parse_with(source, identifier, self.namespaces(), self.config.escaping)
    }

    /// Parse a piece of a template with the namespace bindings and escaping
    /// state that were in effect where it was cut out.
    pub fn parse_fragment(
        &self,
        source: &str,
        identifier: &str,
        namespaces: &NamespaceTable,
        escaping: bool,
    ) -> TemplateResult<ParsedTemplate> {
        self.parse_with(source, identifier, namespaces.clone(), escaping)
    }

    fn parse_with(
        &self,
        source: &str,
        identifier: &str,
        namespaces: NamespaceTable,
        escaping: bool,
    ) -> TemplateResult<ParsedTemplate> {
        let shared: Arc<str> = Arc::from(source);
        let mut run = Run {
            parser: self,
            state: ParsingState::new(identifier, Arc::clone(&shared), namespaces, escaping),
            declared: BTreeSet::new(),
        };
        if let Some(literal) = run.prescan(source) {
            run.state.append_text(&literal);
            return run.state.finish();
        }
        run.consume(Lexer::with_options(source, self.config.lexer.clone()), true)?;
        run.state.finish()
    }
}

/// One ViewHelper argument before it is parsed.
enum RawArgument<'a> {
    /// A tag attribute value.
    Attribute(String, usize),
    /// A value in an inline call.
    Inline(&'a str),
}

/// What an expression body turned into.
enum Outcome {
    Node(NodeId),
    Literal(String),
    Failed(ExpressionError),
}

enum PrefixKind {
    Bound,
    /// Declared by a `{namespace}` directive further down.
    NotYetBound,
    Literal,
}

struct Run<'p> {
    parser: &'p TemplateParser,
    state: ParsingState,
    /// Prefixes bound by a `{namespace}` directive anywhere in the source.
    declared: BTreeSet<String>,
}

impl<'p> Run<'p> {
    /// Apply source-wide declarations. Returns the literal output when
    /// parsing is switched off.
    fn prescan(&mut self, source: &str) -> Option<String> {
        if PARSING_OFF.is_match(source) {
            return Some(PARSING_OFF.replace_all(source, "").into_owned());
        }
        for captures in NAMESPACE_DECLARATIONS.captures_iter(source) {
            let prefix = &captures[1];
            if captures.get(3).is_some() {
                self.declared.insert(prefix.to_string());
            } else {
                self.state
                    .namespaces_mut()
                    .ignore(format!("{prefix}{}", &captures[2]));
            }
        }
        let uri_prefix = self.parser.config.namespace_uri_prefix.as_str();
        for captures in XMLNS_ATTRIBUTES.captures_iter(source) {
            let prefix = &captures[1];
            let uri = captures
                .get(2)
                .or_else(|| captures.get(3))
                .map_or("", |m| m.as_str());
            match target_from_uri(uri, uri_prefix) {
                Some(target) => self.state.namespaces_mut().bind(prefix, target),
                None => self.state.namespaces_mut().ignore(prefix),
            }
        }
        if ESCAPING_OFF.is_match(source) {
            self.state.escaping_mut().set_enabled(false);
        }
        None
    }

    fn consume<'s>(
        &mut self,
        tokens: impl Iterator<Item = Result<Token<'s>, LexError>>,
        intercept: bool,
    ) -> TemplateResult<()> {
        let mut tokens = tokens;
        while let Some(token) = tokens.next() {
            let token = token.map_err(|error| self.lex_error(error))?;
            match token.kind {
                TokenKind::Text => self.text(token.text, intercept),
                TokenKind::Cdata => self.text(cdata_content(token.text), intercept),
                TokenKind::TagOpen | TokenKind::TagClose | TokenKind::TagSelfClose => {
                    self.tag(&token)?;
                }
                TokenKind::ExpressionStart => {
                    let mut body: Option<Token<'s>> = None;
                    for next in tokens.by_ref() {
                        let next = next.map_err(|error| self.lex_error(error))?;
                        if next.kind == TokenKind::ExpressionEnd {
                            break;
                        }
                        body = Some(next);
                    }
                    match body {
                        Some(body) => self.expression(body.text, body.offset, intercept)?,
                        None => self.text("{}", intercept),
                    }
                }
                TokenKind::ExpressionEnd => self.text(token.text, intercept),
            }
        }
        Ok(())
    }

    fn lex_error(&self, error: LexError) -> TemplateError {
        let location = self.state.locate(error.offset());
        ParseError::Lex { error, location }.into()
    }

    fn intercept(&mut self, node: NodeId, point: InterceptionPoint, intercept: bool) -> NodeId {
        if !intercept {
            return node;
        }
        let parser = self.parser;
        parser.config.interceptors.process(node, point, &mut self.state)
    }

    fn text(&mut self, text: &str, intercept: bool) {
        if text.is_empty() {
            return;
        }
        if self.state.ends_with_text() {
            self.state.append_text(text);
            return;
        }
        let node = self.state.alloc(Node::Text {
            text: text.to_string(),
        });
        let node = self.intercept(node, InterceptionPoint::Text, intercept);
        self.state.append(node);
    }

    fn classify_prefix(&self, prefix: &str) -> PrefixKind {
        if self.state.namespaces().is_bound(prefix) {
            PrefixKind::Bound
        } else if self.declared.contains(prefix) && !self.state.namespaces().is_ignored(prefix) {
            PrefixKind::NotYetBound
        } else {
            PrefixKind::Literal
        }
    }

    // ===== tags =====

    fn tag(&mut self, token: &Token<'_>) -> TemplateResult<()> {
        let prefix = token
            .text
            .trim_start_matches('<')
            .trim_start_matches('/')
            .split(':')
            .next()
            .unwrap_or_default();
        match self.classify_prefix(prefix) {
            PrefixKind::Literal => return self.consume(Lexer::text_only(token.text, token.offset), true),
            PrefixKind::NotYetBound => {
                return Err(ParseError::UnknownNamespace {
                    prefix: prefix.to_string(),
                    location: self.state.locate(token.offset),
                }
                .into());
            }
            PrefixKind::Bound => {}
        }

        let tag = parse_tag(token).map_err(|error| self.lex_error(error))?;
        match token.kind {
            TokenKind::TagClose => self.close_tag(&tag.qualified_name(), token.offset),
            kind => {
                let arguments = tag
                    .attributes
                    .iter()
                    .filter(|a| a.name != "xmlns" && !a.name.starts_with("xmlns:"))
                    .map(|a| {
                        (
                            a.name.to_string(),
                            RawArgument::Attribute(a.value.to_string(), a.offset),
                        )
                    })
                    .collect();
                let node = self.view_helper(tag.prefix, tag.name, arguments, token.offset)?;
                if kind == TokenKind::TagSelfClose {
                    let node = self.finish_view_helper(node, InterceptionPoint::SelfClosingViewHelper, true)?;
                    self.state.append(node);
                } else {
                    self.open_tag(node, token.offset + token.text.len());
                }
                Ok(())
            }
        }
    }

    fn open_tag(&mut self, node: NodeId, body_start: usize) {
        // Replacements are only honoured when the tag closes.
        self.intercept(node, InterceptionPoint::OpeningViewHelper, true);
        let escaping = self.state.escaping().is_active();
        let namespaces = self.state.namespaces().clone();
        if let Node::ViewHelper(helper) = self.state.tree_mut().get_mut(node)
            && helper.helper.compile_mode() == CompileMode::InterpretChildren
        {
            helper.body = Some(BodyFragment {
                start: body_start,
                end: body_start,
                namespaces,
                escaping,
            });
        }
        self.state.push(node);
    }

    fn close_tag(&mut self, qualified: &str, offset: usize) -> TemplateResult<()> {
        let location = self.state.locate(offset);
        let current = self.state.current();
        let expected = match self.state.tree().get(current) {
            Node::ViewHelper(helper) if self.state.depth() > 1 => helper.tag.clone(),
            _ => {
                return Err(ParseError::UnexpectedClosingTag {
                    tag: qualified.to_string(),
                    location,
                }
                .into());
            }
        };
        if expected != qualified {
            return Err(ParseError::MismatchedClosingTag {
                expected,
                found: qualified.to_string(),
                location,
            }
            .into());
        }
        self.state.pop();
        if let Node::ViewHelper(helper) = self.state.tree_mut().get_mut(current)
            && let Some(body) = helper.body.as_mut()
        {
            body.end = offset;
        }
        let node = self.finish_view_helper(current, InterceptionPoint::ClosingViewHelper, true)?;
        self.state.append(node);
        Ok(())
    }

    /// Resolve and bind a ViewHelper occurrence. The node is not attached.
    fn view_helper(
        &mut self,
        prefix: &str,
        name: &str,
        arguments: Vec<(String, RawArgument<'_>)>,
        offset: usize,
    ) -> TemplateResult<NodeId> {
        let tag = format!("{prefix}:{name}");
        let location = self.state.locate(offset);
        let parser = self.parser;
        let (key, helper) = self
            .state
            .namespaces()
            .targets(prefix)
            .find_map(|target| {
                parser
                    .resolver
                    .resolve(target, name)
                    .map(|helper| (HelperKey::new(target, name), helper))
            })
            .ok_or_else(|| ParseError::UnknownViewHelper {
                tag: tag.clone(),
                location,
            })?;

        let mut collection = ArgumentCollection::new(
            helper.argument_definitions(),
            helper.additional_arguments_allowed(),
        );
        for (argument, raw) in arguments {
            if !collection.accepts(&argument) {
                return Err(ParseError::UnknownArgument {
                    tag,
                    argument,
                    location,
                }
                .into());
            }
            if collection.get(&argument).is_some() {
                return Err(ParseError::DuplicateArgument {
                    tag,
                    argument,
                    location,
                }
                .into());
            }
            let boolean = collection
                .definition(&argument)
                .is_some_and(|d| d.argument_type() == ArgumentType::Boolean);
            let output = collection
                .definition(&argument)
                .is_some_and(|d| d.is_output());
            let value = match raw {
                RawArgument::Attribute(text, at) if boolean => self.boolean_attribute(&text, at)?,
                RawArgument::Attribute(text, at) => self.argument_text(&text, at)?,
                RawArgument::Inline(text) => self.inline_argument(text, offset, boolean)?,
            };
            if let ArgumentValue::Tree(root) = value
                && output
                && self.state.escaping().is_active()
            {
                self.state.tree_mut().escape_children(root);
            }
            collection.assign(argument, value).map_err(|error| {
                let (argument, duplicate) = match error {
                    BindError::Unknown(argument) => (argument, false),
                    BindError::Duplicate(argument) => (argument, true),
                };
                let tag = tag.clone();
                if duplicate {
                    ParseError::DuplicateArgument {
                        tag,
                        argument,
                        location,
                    }
                } else {
                    ParseError::UnknownArgument {
                        tag,
                        argument,
                        location,
                    }
                }
            })?;
        }
        collection
            .validate_required()
            .map_err(|missing| ParseError::MissingRequiredArgument {
                tag: tag.clone(),
                argument: missing.to_string(),
                location,
            })?;

        if let CompileMode::Uncompilable(reason) = helper.compile_mode() {
            self.state.mark_uncompilable(format!("<{tag}> {reason}"));
        }
        Ok(self.state.alloc(Node::ViewHelper(ViewHelperNode {
            tag,
            key,
            helper,
            arguments: collection,
            children: Vec::new(),
            body: None,
            location,
        })))
    }

    /// Child access and `post_parse` hooks, then interception.
    fn finish_view_helper(
        &mut self,
        node: NodeId,
        point: InterceptionPoint,
        intercept: bool,
    ) -> TemplateResult<NodeId> {
        let (helper, arguments, children, tag, location) = match self.state.tree().get(node) {
            Node::ViewHelper(helper) => (
                Arc::clone(&helper.helper),
                helper.arguments.clone(),
                helper.children.clone(),
                helper.tag.clone(),
                helper.location,
            ),
            _ => return Ok(node),
        };
        if let Some(access) = helper.as_child_node_access() {
            let infos: Vec<ChildNodeInfo> = children
                .iter()
                .map(|child| ChildNodeInfo {
                    id: *child,
                    kind: self.state.tree().child_kind(*child),
                })
                .collect();
            access
                .set_child_nodes(&infos, &mut self.state)
                .map_err(|message| ParseError::InvalidChildren {
                    tag,
                    message,
                    location,
                })?;
        }
        helper.post_parse(&arguments, &mut self.state);
        Ok(self.intercept(node, point, intercept))
    }

    // ===== arguments =====

    /// A parentless root holding `child`.
    fn argument_root(&mut self, child: NodeId) -> NodeId {
        self.state.alloc_adopting(Node::Root {
            children: vec![child],
        })
    }

    /// Template text (text and expressions) as an argument value.
    fn argument_text(&mut self, value: &str, offset: usize) -> TemplateResult<ArgumentValue> {
        if value.is_empty() {
            return Ok(ArgumentValue::Literal(Scalar::String(String::new())));
        }
        let tokens = Lexer::text_only(value, offset)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| self.lex_error(error))?;
        if tokens.iter().all(|token| token.kind == TokenKind::Text) {
            return Ok(ArgumentValue::Literal(Scalar::String(value.to_string())));
        }
        let root = self.state.alloc(Node::Root {
            children: Vec::new(),
        });
        self.state.push(root);
        let result = self.consume(tokens.into_iter().map(Ok), false);
        self.state.pop();
        result?;
        Ok(ArgumentValue::Tree(root))
    }

    /// A `Boolean` argument given as a tag attribute.
    fn boolean_attribute(&mut self, value: &str, offset: usize) -> TemplateResult<ArgumentValue> {
        let trimmed = value.trim();
        if let Some(body) = scan::unbrace(trimmed) {
            if BooleanExpression::is_valid(body, BareWords::Variables) {
                return self.boolean_tree(body, BareWords::Variables, offset);
            }
            let node = self.operand_node(body, offset)?;
            return Ok(ArgumentValue::Tree(self.argument_root(node)));
        }
        if BooleanExpression::is_valid(trimmed, BareWords::Strings) {
            return self.boolean_tree(trimmed, BareWords::Strings, offset);
        }
        if !trimmed.contains('{') {
            return Ok(ArgumentValue::Literal(Scalar::Bool(
                Value::from(value).is_truthy(),
            )));
        }
        self.argument_text(value, offset)
    }

    fn boolean_tree(
        &mut self,
        source: &str,
        bare: BareWords,
        offset: usize,
    ) -> TemplateResult<ArgumentValue> {
        let expression = BooleanExpression::parse(source, bare, &mut OperandSink { run: self, offset })?;
        if let Some(scalar) = expression.as_literal() {
            return Ok(ArgumentValue::Literal(scalar.clone()));
        }
        let node = self.state.alloc_adopting(Node::Boolean { expression });
        Ok(ArgumentValue::Tree(self.argument_root(node)))
    }

    /// A value in an inline call: `f:x(a: 1, b: user.name, c: '{x} items')`.
    fn inline_argument(
        &mut self,
        text: &str,
        offset: usize,
        boolean: bool,
    ) -> TemplateResult<ArgumentValue> {
        let text = text.trim();
        if boolean {
            if let Some(content) = scan::unquote(text) {
                return self.boolean_attribute(&content, offset);
            }
            if BooleanExpression::is_valid(text, BareWords::Variables) {
                return self.boolean_tree(text, BareWords::Variables, offset);
            }
        }
        let node = match classify_operand(text) {
            Some(RawOperand::Literal(Scalar::String(content))) if content.contains('{') => {
                return self.argument_text(&content, offset);
            }
            Some(RawOperand::Literal(scalar)) => return Ok(ArgumentValue::Literal(scalar)),
            Some(RawOperand::Path(path)) => self.accessor(path, offset),
            Some(RawOperand::Braced(body)) => self.operand_node(body, offset)?,
            None => self.operand_node(text, offset)?,
        };
        Ok(ArgumentValue::Tree(self.argument_root(node)))
    }

    // ===== expressions =====

    fn expression(&mut self, body: &str, offset: usize, intercept: bool) -> TemplateResult<()> {
        if self.directive(body) {
            return Ok(());
        }
        match self.classify_expression(body, offset, intercept)? {
            Outcome::Node(node) => self.state.append(node),
            Outcome::Literal(text) => self.text(&text, intercept),
            Outcome::Failed(error) => {
                let placeholder = self.parser.error_handler.handle_expression_error(error)?;
                self.text(&placeholder, intercept);
            }
        }
        Ok(())
    }

    /// Handle `{namespace ...}`, `{escaping ...}` and `{parsing ...}`.
    fn directive(&mut self, body: &str) -> bool {
        let body = body.trim();
        if let Some(captures) = NAMESPACE_DIRECTIVE.captures(body) {
            let prefix = &captures[1];
            match captures.get(2) {
                Some(target) => self.state.namespaces_mut().bind(prefix, target.as_str()),
                None => self.state.namespaces_mut().ignore(prefix),
            }
            return true;
        }
        // Both switches take effect for the whole template during prescan.
        SWITCH_DIRECTIVE.is_match(body)
    }

    /// Brace bodies that are CSS or script blocks rather than expressions.
    fn is_literal_brace(body: &str) -> bool {
        body.trim().is_empty()
            || !body.starts_with(|c: char| {
                c.is_alphanumeric() || matches!(c, '_' | '\'' | '"' | '{' | '(' | '!' | '-' | '.')
            })
            || scan::top_level(body).iter().any(|(_, c)| *c == ';')
    }

    fn classify_expression(
        &mut self,
        body: &str,
        offset: usize,
        intercept: bool,
    ) -> TemplateResult<Outcome> {
        if Self::is_literal_brace(body) {
            return Ok(Outcome::Literal(format!("{{{body}}}")));
        }
        let parser = self.parser;
        for recognizer in &parser.config.recognizers {
            if !recognizer.matches(body) {
                continue;
            }
            let built = recognizer.build(body, &mut OperandSink { run: self, offset });
            let expression = match built {
                Ok(expression) => expression,
                Err(TemplateError::Expression(error)) => return Ok(Outcome::Failed(error)),
                Err(other) => return Err(other),
            };
            if let Expression::Custom(custom) = &expression {
                self.state.mark_uncompilable(format!(
                    "custom expression \"{}\" in {{{}}}",
                    custom.name(),
                    body.trim()
                ));
            }
            let node = self.state.alloc_adopting(Node::Expression {
                expression,
                source: body.trim().to_string(),
            });
            let node = self.intercept(node, InterceptionPoint::Expression, intercept);
            return Ok(Outcome::Node(node));
        }

        let Some(chain) = inline::parse_chain(body) else {
            return Ok(Outcome::Failed(ExpressionError::Unrecognized {
                expression: body.trim().to_string(),
            }));
        };
        for prefix in chain.prefixes() {
            if self.state.namespaces().is_bound(prefix) {
                continue;
            }
            if self.state.namespaces().is_ignored(prefix) {
                return Ok(Outcome::Literal(format!("{{{body}}}")));
            }
            return Err(ParseError::UnknownNamespace {
                prefix: prefix.to_string(),
                location: self.state.locate(offset),
            }
            .into());
        }
        if let (InlineValue::Literal(scalar), true) = (&chain.head, chain.calls.is_empty()) {
            return Ok(Outcome::Literal(scalar.to_value().to_output_string()));
        }
        self.chain(chain, offset, intercept).map(Outcome::Node)
    }

    /// Build `head -> a() -> b()` as `b(a(head))`, intercepted like nested
    /// tags: open `b`, open `a`, the head, close `a`, close `b`.
    fn chain(
        &mut self,
        chain: InlineChain<'_>,
        offset: usize,
        intercept: bool,
    ) -> TemplateResult<NodeId> {
        let mut helpers = Vec::with_capacity(chain.calls.len());
        for call in &chain.calls {
            helpers.push(self.inline_call(call, offset)?);
        }
        for node in helpers.iter().rev() {
            self.intercept(*node, InterceptionPoint::OpeningViewHelper, intercept);
        }
        let mut current = match chain.head {
            InlineValue::Call(call) => {
                let node = self.inline_call(&call, offset)?;
                self.finish_view_helper(node, InterceptionPoint::SelfClosingViewHelper, intercept)?
            }
            InlineValue::Path(path) => {
                let node = self.accessor(path, offset);
                self.intercept(node, InterceptionPoint::ObjectAccessor, intercept)
            }
            InlineValue::Literal(scalar) => self.state.alloc(Node::Text {
                text: scalar.to_value().to_output_string(),
            }),
            InlineValue::Array(pairs) => self.array(pairs, offset)?,
        };
        for node in helpers {
            self.state.tree_mut().append_child(node, current);
            current = self.finish_view_helper(node, InterceptionPoint::ClosingViewHelper, intercept)?;
        }
        Ok(current)
    }

    fn inline_call(&mut self, call: &InlineCall<'_>, offset: usize) -> TemplateResult<NodeId> {
        let arguments = call
            .arguments
            .iter()
            .map(|(name, value)| (name.clone(), RawArgument::Inline(value)))
            .collect();
        self.view_helper(call.prefix, call.name, arguments, offset)
    }

    fn array(&mut self, pairs: Vec<(String, &str)>, offset: usize) -> TemplateResult<NodeId> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, raw) in pairs {
            let operand = match classify_operand(raw) {
                Some(RawOperand::Literal(scalar)) => Operand::Literal(scalar),
                Some(RawOperand::Path(path)) => Operand::Ref(self.accessor(path, offset)),
                Some(RawOperand::Braced(body)) => Operand::Ref(self.operand_node(body, offset)?),
                None => Operand::Ref(self.operand_node(raw, offset)?),
            };
            entries.push((key, operand));
        }
        Ok(self.state.alloc_adopting(Node::Array { entries }))
    }

    fn accessor(&mut self, path: &str, offset: usize) -> NodeId {
        let location = self.state.locate(offset);
        self.state.alloc(Node::ObjectAccessor {
            path: path.to_string(),
            location,
        })
    }

    /// An expression used as an operand or argument: never intercepted and
    /// never attached.
    fn operand_node(&mut self, body: &str, offset: usize) -> TemplateResult<NodeId> {
        let text = match self.classify_expression(body, offset, false)? {
            Outcome::Node(node) => return Ok(node),
            Outcome::Literal(text) => text,
            Outcome::Failed(error) => self.parser.error_handler.handle_expression_error(error)?,
        };
        Ok(self.state.alloc(Node::Text { text }))
    }
}

/// Allocates operand nodes for recognizers and boolean expressions.
struct OperandSink<'r, 'p> {
    run: &'r mut Run<'p>,
    offset: usize,
}

impl OperandBuilder for OperandSink<'_, '_> {
    fn path(&mut self, path: &str) -> TemplateResult<NodeId> {
        Ok(self.run.accessor(path, self.offset))
    }

    fn nested(&mut self, content: &str) -> TemplateResult<NodeId> {
        self.run.operand_node(content, self.offset)
    }
}
