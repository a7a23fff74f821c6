//! Token-budgeted batch packing.
//!
//! Records are serialized as delimiter-separated rows under a header and
//! grouped into batches whose estimated token count never exceeds the
//! ceiling. Each closed batch is sorted by weight then rank (descending)
//! before rendering.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::token::{HeuristicCounter, TokenCounter};

/// A tabular record set: column names and string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ContextTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column(&self, name: &str) -> Vec<&str> {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => self
                .rows
                .iter()
                .filter_map(|row| row.get(idx).map(String::as_str))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Header line plus one line per row, each newline terminated.
    pub fn to_csv(&self, delimiter: &str) -> String {
        let mut out = encode_row(&self.columns, delimiter);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&encode_row(row, delimiter));
            out.push('\n');
        }
        out
    }
}

// Serializes as an array of objects keyed by column name.
impl Serialize for ContextTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowView {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

struct RowView<'a> {
    columns: &'a [String],
    row: &'a [String],
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.row) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

/// Quote a field when it contains the delimiter, a quote or a line break.
pub fn encode_field(field: &str, delimiter: &str) -> String {
    let needs_quotes = field.contains(delimiter)
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r');
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn encode_row<S: AsRef<str>>(cells: &[S], delimiter: &str) -> String {
    cells
        .iter()
        .map(|c| encode_field(c.as_ref(), delimiter))
        .collect::<Vec<_>>()
        .join(delimiter)
}

/// Something the packer can place in a batch.
pub trait Packable {
    fn is_included(&self) -> bool;

    /// Batch sort key `(weight, rank)`, both descending.
    fn sort_key(&self) -> (f64, f64);
}

impl Packable for hybridrag_core::record::CommunityReport {
    fn is_included(&self) -> bool {
        hybridrag_core::record::CommunityReport::is_included(self)
    }

    fn sort_key(&self) -> (f64, f64) {
        (self.weight, self.rank)
    }
}

impl Packable for hybridrag_core::record::Chunk {
    fn is_included(&self) -> bool {
        hybridrag_core::record::Chunk::is_included(self)
    }

    fn sort_key(&self) -> (f64, f64) {
        (0.0, self.relevance_score)
    }
}

/// Result of packing one record set.
#[derive(Debug, Clone, Default)]
pub struct PackedContext {
    /// Rendered batches; only the first carries the `-----{name}-----` title.
    pub batches: Vec<String>,
    /// Estimated tokens of each batch, including the title line.
    pub batch_tokens: Vec<usize>,
    /// Every packed row across all batches.
    pub table: ContextTable,
}

impl PackedContext {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

struct Batch {
    tokens: usize,
    rows: Vec<((f64, f64), Vec<String>)>,
}

/// Packs records into token-bounded batches.
#[derive(Clone)]
pub struct BatchPacker {
    name: String,
    delimiter: String,
    max_tokens: usize,
    single_batch: bool,
    shuffle_seed: Option<u64>,
    sort_by_weight: bool,
    sort_by_rank: bool,
    counter: Arc<dyn TokenCounter>,
}

impl BatchPacker {
    pub fn new(name: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            name: name.into(),
            delimiter: "|".into(),
            max_tokens,
            single_batch: false,
            shuffle_seed: None,
            sort_by_weight: true,
            sort_by_rank: true,
            counter: Arc::new(HeuristicCounter),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Stop accepting records at the first overflow.
    pub fn with_single_batch(mut self, single_batch: bool) -> Self {
        self.single_batch = single_batch;
        self
    }

    /// Shuffle included records deterministically before packing.
    pub fn with_shuffle(mut self, seed: Option<u64>) -> Self {
        self.shuffle_seed = seed;
        self
    }

    /// Which halves of the sort key order a batch. Columns left out of the
    /// header should not influence row order.
    pub fn with_sort_columns(mut self, weight: bool, rank: bool) -> Self {
        self.sort_by_weight = weight;
        self.sort_by_rank = rank;
        self
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    fn sort_key<R: Packable>(&self, record: &R) -> (f64, f64) {
        let (weight, rank) = record.sort_key();
        (
            if self.sort_by_weight { weight } else { 0.0 },
            if self.sort_by_rank { rank } else { 0.0 },
        )
    }

    fn title(&self) -> String {
        format!("-----{}-----\n", self.name)
    }

    /// Pack `records` under `header`, rendering each with `to_row`.
    pub fn pack<R, F>(&self, records: Vec<R>, header: &[String], to_row: F) -> PackedContext
    where
        R: Packable,
        F: Fn(&R) -> Vec<String>,
    {
        let mut selected: Vec<R> = records.into_iter().filter(|r| r.is_included()).collect();
        if selected.is_empty() {
            warn!("No {} records added when building context", self.name.to_lowercase());
            return PackedContext::default();
        }

        if let Some(seed) = self.shuffle_seed {
            selected.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let header_line = encode_row(header, &self.delimiter);
        let init_tokens = self
            .counter
            .count(&format!("{}{header_line}\n", self.title()));

        let mut closed: Vec<Batch> = Vec::new();
        let mut current = Batch { tokens: init_tokens, rows: Vec::new() };

        for record in &selected {
            let cells = to_row(record);
            let line = format!("{}\n", encode_row(&cells, &self.delimiter));
            let cost = self.counter.count(&line);

            if init_tokens + cost > self.max_tokens {
                debug!(cost, ceiling = self.max_tokens, "Record larger than an empty batch, skipped");
                continue;
            }

            if current.tokens + cost > self.max_tokens {
                if self.single_batch {
                    break;
                }
                let full = std::mem::replace(&mut current, Batch { tokens: init_tokens, rows: Vec::new() });
                closed.push(full);
            }

            current.tokens += cost;
            current.rows.push((self.sort_key(record), cells));
        }

        if !current.rows.is_empty() {
            closed.push(current);
        }

        if closed.is_empty() {
            warn!("No {} records added when building context", self.name.to_lowercase());
            return PackedContext::default();
        }

        let mut packed = PackedContext {
            table: ContextTable::new(header.to_vec()),
            ..Default::default()
        };

        for mut batch in closed {
            batch.rows.sort_by(|(a, _), (b, _)| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
            });

            let mut table = ContextTable::new(header.to_vec());
            table.rows = batch.rows.into_iter().map(|(_, cells)| cells).collect();

            let mut text = table.to_csv(&self.delimiter);
            if packed.batches.is_empty() {
                text = format!("{}{text}", self.title());
            }

            packed.batches.push(text);
            packed.batch_tokens.push(batch.tokens);
            packed.table.rows.extend(table.rows);
        }

        debug!(
            name = %self.name,
            batches = packed.batches.len(),
            records = packed.table.len(),
            "Packed context"
        );
        packed
    }
}
