//! A row-batch reader over a JSON byte stream, wiring the structural
//! parsers to a result set loader. The schema is always late: columns
//! appear as the parser first sees them.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use snafu::location;

use rsf_core::errors::{Error, Result};
use rsf_core::internal_err;
use rsf_rowset::ResultSetLoader;
use rsf_scan::negotiator::{SchemaNegotiator, SchemaType};
use rsf_scan::reader::RowBatchReader;

use crate::options::JsonOptions;
use crate::parser::{ObjectParser, ParseContext};
use crate::tokenizer::{JsonToken, Tokenizer};

pub struct JsonBatchReader {
    source: Bytes,
    options: JsonOptions,
    file_path: Option<PathBuf>,
    selection_root: Option<PathBuf>,
    tokenizer: Option<Tokenizer>,
    root: ObjectParser,
    outer_list_entered: bool,
}

impl JsonBatchReader {
    pub fn new(source: impl Into<Bytes>, options: JsonOptions) -> Self {
        Self {
            source: source.into(),
            options,
            file_path: None,
            selection_root: None,
            tokenizer: None,
            root: ObjectParser::root(),
            outer_list_entered: false,
        }
    }

    pub fn from_file(path: impl AsRef<Path>, options: JsonOptions) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| Error::IO(format!("cannot read {}: {}", path.display(), e), location!()))?;
        Ok(Self::new(data, options))
    }

    /// Attach the file identity used for the implicit columns.
    pub fn with_file_identity(
        mut self,
        file_path: impl Into<PathBuf>,
        selection_root: impl Into<PathBuf>,
    ) -> Self {
        self.file_path = Some(file_path.into());
        self.selection_root = Some(selection_root.into());
        self
    }

    pub fn boxed(self) -> Box<dyn RowBatchReader> {
        Box::new(self)
    }
}

impl RowBatchReader for JsonBatchReader {
    fn open(&mut self, negotiator: &mut SchemaNegotiator<'_>) -> Result<bool> {
        negotiator.set_table_schema_type(SchemaType::Late);
        if let Some(rows) = self.options.batch_size() {
            negotiator.set_batch_size(rows);
        }
        if let Some(path) = &self.file_path {
            negotiator.set_file_path(path.clone());
        }
        if let Some(root) = &self.selection_root {
            negotiator.set_selection_root(root.clone());
        }
        let mut tokenizer = Tokenizer::new(self.source.clone(), self.options.allow_nan_inf());
        match tokenizer.next_token()? {
            // nothing at all: skip this reader
            None => Ok(false),
            Some(token) => {
                tokenizer.push_back(token);
                self.tokenizer = Some(tokenizer);
                Ok(true)
            }
        }
    }

    fn next_batch(&mut self, loader: &mut ResultSetLoader) -> Result<bool> {
        let Some(tokenizer) = self.tokenizer.as_mut() else {
            return internal_err!("json reader was not opened");
        };
        let mut cx = ParseContext {
            loader,
            options: &self.options,
            path: Vec::new(),
        };
        let mut more = true;
        loop {
            if cx.loader.is_full() {
                break;
            }
            let Some(token) = tokenizer.next_token().map_err(|e| cx.attach_path(e))? else {
                more = false;
                break;
            };
            match token {
                JsonToken::ArrayStart
                    if self.options.skip_outer_list() && !self.outer_list_entered =>
                {
                    self.outer_list_entered = true;
                }
                JsonToken::ArrayEnd if self.outer_list_entered => {
                    if let Some(extra) = tokenizer.next_token()? {
                        return Err(cx.syntax_error(
                            tokenizer,
                            format!("trailing {} after the outer list", extra.description()),
                        ));
                    }
                    more = false;
                    break;
                }
                JsonToken::Comma => {}
                JsonToken::ObjectStart => {
                    cx.loader.start_row()?;
                    self.root.parse(&mut cx, tokenizer)?;
                    cx.loader.save_row()?;
                }
                other => {
                    return Err(cx.syntax_error(
                        tokenizer,
                        format!("expected a row object, found {}", other.description()),
                    ))
                }
            }
        }
        // batch end: any field still untyped is forced to varchar
        self.root
            .resolve_deferred(loader, &self.options, &mut Vec::new())?;
        Ok(more)
    }
}
