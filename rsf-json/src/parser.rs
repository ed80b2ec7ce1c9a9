//! Recursive structural parsers over the token stream. There is no AST:
//! each node drives a column writer directly.
//!
//! A field's parser is chosen from its first value token and lives in the
//! parent's member map; deferred nodes (`NullType`, `NullArray`) occupy the
//! slot until a typed value appears or the batch ends.

use std::collections::HashMap;

use arrow_schema::DataType;

use rsf_core::errors::{Error, Result};
use rsf_core::nyi_err;
use rsf_core::schema::{ColumnSchema, DataMode, TupleSchema};
use rsf_rowset::{ColumnHandle, ResultSetLoader, ValueRef};

use crate::extended::{peek_extended, ExtendedParser};
use crate::options::JsonOptions;
use crate::tokenizer::{JsonToken, Tokenizer};

/// State shared by the parser tree during one row.
pub(crate) struct ParseContext<'a> {
    pub loader: &'a mut ResultSetLoader,
    pub options: &'a JsonOptions,
    /// Field-name stack for error reporting.
    pub path: Vec<String>,
}

impl ParseContext<'_> {
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(|p| format!("\"{}\"", p))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn syntax_error(&self, tokenizer: &Tokenizer, message: impl Into<String>) -> Error {
        Error::Syntax {
            message: message.into(),
            path: self.path_string(),
            offset: tokenizer.last_offset(),
        }
    }

    /// Attach the current field path to a tokenizer-raised error.
    pub fn attach_path(&self, mut error: Error) -> Error {
        if let Error::Syntax { path, .. } = &mut error {
            if path.is_empty() {
                *path = self.path_string();
            }
        }
        error
    }
}

pub(crate) fn require(cx: &ParseContext<'_>, tokenizer: &mut Tokenizer) -> Result<JsonToken> {
    match tokenizer.next_token().map_err(|e| cx.attach_path(e))? {
        Some(token) => Ok(token),
        None => Err(cx.syntax_error(tokenizer, "unexpected end of input")),
    }
}

/// The columnar type a scalar parser writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarTarget {
    Bool,
    Long,
    Double,
    Text,
}

impl ScalarTarget {
    pub fn data_type(self) -> DataType {
        match self {
            ScalarTarget::Bool => DataType::Boolean,
            ScalarTarget::Long => DataType::Int64,
            ScalarTarget::Double => DataType::Float64,
            ScalarTarget::Text => DataType::Utf8,
        }
    }

    pub fn from_data_type(data_type: &DataType) -> Option<ScalarTarget> {
        match data_type {
            DataType::Boolean => Some(ScalarTarget::Bool),
            DataType::Int32 | DataType::Int64 => Some(ScalarTarget::Long),
            DataType::Float64 => Some(ScalarTarget::Double),
            DataType::Utf8 => Some(ScalarTarget::Text),
            _ => None,
        }
    }

    fn from_token(token: &JsonToken, options: &JsonOptions) -> ScalarTarget {
        if options.all_text_mode() {
            return ScalarTarget::Text;
        }
        match token {
            JsonToken::Bool(_) => ScalarTarget::Bool,
            JsonToken::Str(_) => ScalarTarget::Text,
            JsonToken::Number(text) => {
                if options.read_numbers_as_double() || !number_is_integral(text) {
                    ScalarTarget::Double
                } else {
                    ScalarTarget::Long
                }
            }
            _ => ScalarTarget::Text,
        }
    }
}

fn number_is_integral(text: &str) -> bool {
    !text.contains(['.', 'e', 'E']) && text.parse::<i64>().is_ok()
}

/// Convert one scalar token into the value a writer of `target` accepts.
fn scalar_value<'t>(
    cx: &ParseContext<'_>,
    tokenizer: &Tokenizer,
    target: ScalarTarget,
    token: &'t JsonToken,
) -> Result<ValueRef<'t>> {
    Ok(match (target, token) {
        (_, JsonToken::Null) => ValueRef::Null,
        // text mode keeps the JSON textual form
        (ScalarTarget::Text, JsonToken::Str(s)) => ValueRef::Str(s),
        (ScalarTarget::Text, JsonToken::Number(n)) => ValueRef::Str(n),
        (ScalarTarget::Text, JsonToken::Bool(true)) => ValueRef::Str("true"),
        (ScalarTarget::Text, JsonToken::Bool(false)) => ValueRef::Str("false"),
        (ScalarTarget::Bool, JsonToken::Bool(b)) => ValueRef::Bool(*b),
        (ScalarTarget::Bool, JsonToken::Str(s)) => ValueRef::Str(s),
        (ScalarTarget::Long, JsonToken::Number(text)) => match text.parse::<i64>() {
            Ok(v) => ValueRef::Long(v),
            Err(_) => ValueRef::Double(parse_double(cx, tokenizer, text)?),
        },
        (ScalarTarget::Double, JsonToken::Number(text)) => {
            ValueRef::Double(parse_double(cx, tokenizer, text)?)
        }
        // writers parse strings against their own type
        (ScalarTarget::Long | ScalarTarget::Double, JsonToken::Str(s)) => ValueRef::Str(s),
        (_, other) => {
            return Err(cx.syntax_error(
                tokenizer,
                format!("unexpected {} for a scalar field", other.description()),
            ))
        }
    })
}

fn parse_double(cx: &ParseContext<'_>, tokenizer: &Tokenizer, text: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|_| cx.syntax_error(tokenizer, format!("malformed number `{}`", text)))
}

/// One field's parser, owned by the parent's member map.
pub(crate) enum ElementParser {
    /// The field is unprojected: consume its tokens, write nothing.
    Dummy,
    /// Only nulls seen so far; typed on the next non-null value or forced
    /// to text-mode varchar at batch end.
    NullType,
    /// Only `[]` and null seen so far.
    NullArray,
    Scalar {
        handle: ColumnHandle,
        target: ScalarTarget,
    },
    Object(ObjectParser),
    Array(ArrayParser),
    Extended(ExtendedParser),
}

pub(crate) struct ObjectParser {
    /// None for the row tuple at the scan root.
    pub(crate) handle: Option<ColumnHandle>,
    members: HashMap<String, ElementParser>,
}

impl ObjectParser {
    pub fn root() -> Self {
        Self {
            handle: None,
            members: HashMap::new(),
        }
    }

    fn for_column(handle: ColumnHandle) -> Self {
        Self {
            handle: Some(handle),
            members: HashMap::new(),
        }
    }

    /// Parse the object body; the opening brace is already consumed.
    pub fn parse(&mut self, cx: &mut ParseContext<'_>, tokenizer: &mut Tokenizer) -> Result<()> {
        loop {
            let token = require(cx, tokenizer)?;
            match token {
                JsonToken::ObjectEnd => break,
                JsonToken::Comma => continue,
                JsonToken::Str(name) => {
                    let colon = require(cx, tokenizer)?;
                    if colon != JsonToken::Colon {
                        return Err(cx.syntax_error(
                            tokenizer,
                            format!("expected `:` after field \"{}\"", name),
                        ));
                    }
                    let first = require(cx, tokenizer)?;
                    cx.path.push(name.clone());
                    let result = self.parse_member(cx, tokenizer, &name, first);
                    cx.path.pop();
                    result?;
                }
                other => {
                    return Err(cx.syntax_error(
                        tokenizer,
                        format!("expected a field name, found {}", other.description()),
                    ))
                }
            }
        }
        if let Some(handle) = &self.handle {
            cx.loader.finish_tuple(handle)?;
        }
        Ok(())
    }

    fn parse_member(
        &mut self,
        cx: &mut ParseContext<'_>,
        tokenizer: &mut Tokenizer,
        name: &str,
        first: JsonToken,
    ) -> Result<()> {
        if !self.members.contains_key(name) {
            let parser = make_parser(cx, tokenizer, self.handle.as_ref(), name, &first)?;
            self.members.insert(name.to_string(), parser);
        }
        let parent = self.handle.clone();
        let Some(slot) = self.members.get_mut(name) else {
            return Err(Error::Internal(format!("missing parser for field `{}`", name)));
        };
        parse_value(slot, cx, tokenizer, first, parent.as_ref(), name)
    }

    /// Force still-deferred fields to a concrete type at batch end.
    pub fn resolve_deferred(
        &mut self,
        loader: &mut ResultSetLoader,
        options: &JsonOptions,
        path: &mut Vec<String>,
    ) -> Result<()> {
        for (name, slot) in self.members.iter_mut() {
            path.push(name.clone());
            match slot {
                ElementParser::NullType => {
                    let dotted = path.join(".");
                    let (target, data_type) = hint_or_text(options, &dotted);
                    let column = ColumnSchema::optional(name.clone(), data_type);
                    let handle = match &self.handle {
                        None => loader.add_column(column)?,
                        Some(parent) => loader.add_member(parent, column)?,
                    };
                    *slot = ElementParser::Scalar { handle, target };
                }
                ElementParser::NullArray => {
                    log::warn!(
                        "array field `{}` was empty or null for a whole batch; forcing varchar elements",
                        path.join(".")
                    );
                    let dense = options.use_repeated_arrays();
                    let column = ColumnSchema::repeated(name.clone(), DataType::Utf8)
                        .with_nullable_elements(!dense);
                    let handle = match &self.handle {
                        None => loader.add_column(column)?,
                        Some(parent) => loader.add_member(parent, column)?,
                    };
                    *slot = ElementParser::Array(ArrayParser {
                        handle,
                        element: ArrayElement::Scalar(ScalarTarget::Text),
                    });
                }
                ElementParser::Object(child) => child.resolve_deferred(loader, options, path)?,
                ElementParser::Array(array) => {
                    if let ArrayElement::Map(child) = &mut array.element {
                        child.resolve_deferred(loader, options, path)?;
                    }
                }
                _ => {}
            }
            path.pop();
        }
        Ok(())
    }
}

fn hint_or_text(options: &JsonOptions, dotted: &str) -> (ScalarTarget, DataType) {
    if let Some(hinted) = options.type_hint().and_then(|hint| hint(dotted)) {
        if let Some(target) = ScalarTarget::from_data_type(&hinted) {
            return (target, hinted);
        }
        log::warn!(
            "type hint for all-null field `{}` is unsupported ({}); using varchar",
            dotted,
            hinted
        );
        return (ScalarTarget::Text, DataType::Utf8);
    }
    log::warn!(
        "field `{}` contained only nulls for a whole batch; forcing it to varchar, \
         a later typed value will change the schema",
        dotted
    );
    (ScalarTarget::Text, DataType::Utf8)
}

pub(crate) enum ArrayElement {
    Scalar(ScalarTarget),
    Map(Box<ObjectParser>),
    /// An array of arrays of scalars; deeper nesting is not supported.
    Nested {
        inner: ColumnHandle,
        target: ScalarTarget,
    },
}

pub(crate) struct ArrayParser {
    handle: ColumnHandle,
    element: ArrayElement,
}

impl ArrayParser {
    /// Parse one array value for the current row: `null` or `[ ... ]`.
    fn parse_entry(
        &mut self,
        cx: &mut ParseContext<'_>,
        tokenizer: &mut Tokenizer,
        first: JsonToken,
    ) -> Result<()> {
        match first {
            JsonToken::Null => cx.loader.set_null(&self.handle),
            JsonToken::ArrayStart => {
                loop {
                    let token = require(cx, tokenizer)?;
                    match token {
                        JsonToken::ArrayEnd => break,
                        JsonToken::Comma => continue,
                        token => self.parse_element(cx, tokenizer, token)?,
                    }
                }
                cx.loader.finish_array(&self.handle)
            }
            other => Err(cx.syntax_error(
                tokenizer,
                format!("expected an array, found {}", other.description()),
            )),
        }
    }

    fn parse_element(
        &mut self,
        cx: &mut ParseContext<'_>,
        tokenizer: &mut Tokenizer,
        token: JsonToken,
    ) -> Result<()> {
        match &mut self.element {
            ArrayElement::Scalar(target) => match token {
                JsonToken::ObjectStart | JsonToken::ArrayStart => Err(cx.syntax_error(
                    tokenizer,
                    "nested value in an array of scalars",
                )),
                token => {
                    let value = scalar_value(cx, tokenizer, *target, &token)?;
                    cx.loader.append_array_value(&self.handle, value)
                }
            },
            ArrayElement::Map(parser) => match token {
                JsonToken::ObjectStart => {
                    parser.parse(cx, tokenizer)?;
                    cx.loader.advance_array(&self.handle)
                }
                JsonToken::Null => {
                    if let Some(handle) = &parser.handle {
                        cx.loader.set_null(handle)?;
                    }
                    cx.loader.advance_array(&self.handle)
                }
                other => Err(cx.syntax_error(
                    tokenizer,
                    format!("expected an object element, found {}", other.description()),
                )),
            },
            ArrayElement::Nested { inner, target } => match token {
                JsonToken::ArrayStart => {
                    loop {
                        let token = require(cx, tokenizer)?;
                        match token {
                            JsonToken::ArrayEnd => break,
                            JsonToken::Comma => continue,
                            JsonToken::ObjectStart | JsonToken::ArrayStart => {
                                return nyi_err!("arrays nested deeper than two levels")
                            }
                            token => {
                                let value = scalar_value(cx, tokenizer, *target, &token)?;
                                cx.loader.append_array_value(inner, value)?;
                            }
                        }
                    }
                    cx.loader.finish_array(inner)?;
                    cx.loader.advance_array(&self.handle)
                }
                JsonToken::Null => {
                    cx.loader.set_null(inner)?;
                    cx.loader.advance_array(&self.handle)
                }
                other => Err(cx.syntax_error(
                    tokenizer,
                    format!("expected a nested array, found {}", other.description()),
                )),
            },
        }
    }
}

/// Choose a parser for a field from its first value token.
pub(crate) fn make_parser(
    cx: &mut ParseContext<'_>,
    tokenizer: &mut Tokenizer,
    parent: Option<&ColumnHandle>,
    name: &str,
    first: &JsonToken,
) -> Result<ElementParser> {
    // unprojected top-level fields consume tokens without vector writes
    if parent.is_none()
        && !cx
            .loader
            .options()
            .projection()
            .is_projected(name)
    {
        return Ok(ElementParser::Dummy);
    }
    match first {
        JsonToken::Null => Ok(ElementParser::NullType),
        JsonToken::Bool(_) | JsonToken::Number(_) | JsonToken::Str(_) => {
            let target = ScalarTarget::from_token(first, cx.options);
            let column = ColumnSchema::optional(name, target.data_type());
            let handle = add_column(cx, parent, column)?;
            Ok(ElementParser::Scalar { handle, target })
        }
        JsonToken::ObjectStart => {
            if cx.options.extended_types() {
                if let Some(kind) = peek_extended(cx, tokenizer)? {
                    let handle = add_column(cx, parent, kind.column(name))?;
                    return Ok(ElementParser::Extended(ExtendedParser::new(kind, handle)));
                }
            }
            let column = ColumnSchema::map(name, DataMode::Optional, TupleSchema::new());
            let handle = add_column(cx, parent, column)?;
            Ok(ElementParser::Object(ObjectParser::for_column(handle)))
        }
        JsonToken::ArrayStart => detect_array(cx, tokenizer, parent, name),
        other => Err(cx.syntax_error(
            tokenizer,
            format!("unexpected {}", other.description()),
        )),
    }
}

fn add_column(
    cx: &mut ParseContext<'_>,
    parent: Option<&ColumnHandle>,
    column: ColumnSchema,
) -> Result<ColumnHandle> {
    match parent {
        None => cx.loader.add_column(column),
        Some(parent) => cx.loader.add_member(parent, column),
    }
}

/// Realise an array column from its first element token. An empty or
/// null-only array stays deferred; a null or nested element forces the
/// generic list realisation over the dense repeated one.
fn detect_array(
    cx: &mut ParseContext<'_>,
    tokenizer: &mut Tokenizer,
    parent: Option<&ColumnHandle>,
    name: &str,
) -> Result<ElementParser> {
    let peek = require(cx, tokenizer)?;
    tokenizer.push_back(peek.clone());
    match peek {
        JsonToken::ArrayEnd | JsonToken::Null => Ok(ElementParser::NullArray),
        JsonToken::Bool(_) | JsonToken::Number(_) | JsonToken::Str(_) => {
            let target = ScalarTarget::from_token(&peek, cx.options);
            let dense = cx.options.use_repeated_arrays();
            let column = ColumnSchema::repeated(name, target.data_type())
                .with_nullable_elements(!dense);
            let handle = add_column(cx, parent, column)?;
            Ok(ElementParser::Array(ArrayParser {
                handle,
                element: ArrayElement::Scalar(target),
            }))
        }
        JsonToken::ObjectStart => {
            let column = ColumnSchema::map(name, DataMode::Repeated, TupleSchema::new())
                .with_nullable_elements(true);
            let handle = add_column(cx, parent, column)?;
            let element = cx.loader.element(&handle);
            Ok(ElementParser::Array(ArrayParser {
                handle,
                element: ArrayElement::Map(Box::new(ObjectParser::for_column(element))),
            }))
        }
        JsonToken::ArrayStart => {
            // consume the inner `[` again and look one level deeper
            let inner_start = require(cx, tokenizer)?;
            let deep = require(cx, tokenizer)?;
            tokenizer.push_back(deep.clone());
            tokenizer.push_back(inner_start);
            match deep {
                JsonToken::ArrayEnd | JsonToken::Null => Ok(ElementParser::NullArray),
                JsonToken::Bool(_) | JsonToken::Number(_) | JsonToken::Str(_) => {
                    let target = ScalarTarget::from_token(&deep, cx.options);
                    let inner_schema = ColumnSchema::repeated(name, target.data_type())
                        .with_nullable_elements(true);
                    let column = ColumnSchema::repeated_complex(name, inner_schema)
                        .with_nullable_elements(true);
                    let handle = add_column(cx, parent, column)?;
                    let inner = cx.loader.element(&handle);
                    Ok(ElementParser::Array(ArrayParser {
                        handle,
                        element: ArrayElement::Nested { inner, target },
                    }))
                }
                JsonToken::ObjectStart | JsonToken::ArrayStart => {
                    nyi_err!("arrays nested deeper than two levels")
                }
                other => Err(cx.syntax_error(
                    tokenizer,
                    format!("unexpected {}", other.description()),
                )),
            }
        }
        other => Err(cx.syntax_error(
            tokenizer,
            format!("unexpected {}", other.description()),
        )),
    }
}

/// Drive one value into the field's parser, replacing deferred placeholders
/// in place when the value finally types them.
pub(crate) fn parse_value(
    slot: &mut ElementParser,
    cx: &mut ParseContext<'_>,
    tokenizer: &mut Tokenizer,
    first: JsonToken,
    parent: Option<&ColumnHandle>,
    name: &str,
) -> Result<()> {
    match slot {
        ElementParser::Dummy => skip_value(cx, tokenizer, first),
        ElementParser::NullType => match first {
            JsonToken::Null => Ok(()),
            other => {
                let mut parser = make_parser(cx, tokenizer, parent, name, &other)?;
                let result = parse_value(&mut parser, cx, tokenizer, other, parent, name);
                *slot = parser;
                result
            }
        },
        ElementParser::NullArray => match first {
            JsonToken::Null => Ok(()),
            JsonToken::ArrayStart => {
                let mut parser = make_parser(cx, tokenizer, parent, name, &JsonToken::ArrayStart)?;
                if matches!(parser, ElementParser::NullArray) {
                    // still nothing to type it with
                    return skip_value(cx, tokenizer, JsonToken::ArrayStart);
                }
                let result =
                    parse_value(&mut parser, cx, tokenizer, JsonToken::ArrayStart, parent, name);
                *slot = parser;
                result
            }
            other => Err(cx.syntax_error(
                tokenizer,
                format!("expected an array, found {}", other.description()),
            )),
        },
        ElementParser::Scalar { handle, target } => match first {
            JsonToken::ObjectStart | JsonToken::ArrayStart => Err(cx.syntax_error(
                tokenizer,
                "scalar field changed to a nested value",
            )),
            token => {
                let value = scalar_value(cx, tokenizer, *target, &token)?;
                cx.loader.set_value(handle, value)
            }
        },
        ElementParser::Object(parser) => match first {
            JsonToken::ObjectStart => parser.parse(cx, tokenizer),
            JsonToken::Null => {
                if let Some(handle) = &parser.handle {
                    cx.loader.set_null(handle)?;
                }
                Ok(())
            }
            other => Err(cx.syntax_error(
                tokenizer,
                format!("expected an object, found {}", other.description()),
            )),
        },
        ElementParser::Array(parser) => parser.parse_entry(cx, tokenizer, first),
        ElementParser::Extended(parser) => parser.parse(cx, tokenizer, first),
    }
}

/// Consume one complete value without writing anything.
pub(crate) fn skip_value(
    cx: &ParseContext<'_>,
    tokenizer: &mut Tokenizer,
    first: JsonToken,
) -> Result<()> {
    let mut depth: usize = match first {
        JsonToken::ObjectStart | JsonToken::ArrayStart => 1,
        _ => return Ok(()),
    };
    while depth > 0 {
        match require(cx, tokenizer)? {
            JsonToken::ObjectStart | JsonToken::ArrayStart => depth += 1,
            JsonToken::ObjectEnd | JsonToken::ArrayEnd => depth -= 1,
            _ => {}
        }
    }
    Ok(())
}
