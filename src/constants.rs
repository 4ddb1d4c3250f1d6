//! Sizing constants shared across the storage core.

/// Page size in bytes. 4 KiB is the spec's recommended size and keeps a single
/// page's slot directory, cell area and header comfortably inside one disk
/// sector multiple.
pub const PAGE_SIZE: usize = 4096;

/// Bytes reserved for `page_type | next_page | data_size` on an overflow page.
pub const OVERFLOW_HEADER_SIZE: usize = 1 + 4 + 4;

/// Maximum number of overflow pages a single text value may span.
pub const MAX_OVERFLOW_PAGES: usize = 16;

/// Largest inline varchar payload before it spills to an overflow chain.
pub const MAX_INLINE_VARCHAR: usize = 255;

/// Largest text value representable: `MAX_OVERFLOW_PAGES * (PAGE_SIZE - OVERFLOW_HEADER_SIZE)`.
pub const MAX_TEXT_LEN: usize = MAX_OVERFLOW_PAGES * (PAGE_SIZE - OVERFLOW_HEADER_SIZE);

/// Maximum number of columns in a table (bounds the null bitmap to 8 bytes).
pub const MAX_COLUMNS: usize = 64;

/// Row-ID budget kept inline in a non-unique index cell before an overflow
/// chain of extra row-IDs is attached.
pub const INLINE_ROWID_BUDGET: usize = 4;

/// Selectivity threshold below which a range condition becomes an index scan
/// rather than a sequential scan.
pub const RANGE_SELECTIVITY_THRESHOLD: f64 = 0.30;

/// Row-count threshold above which the planner prefers a filtered index's
/// selectivity over a matching ORDER BY index, pushing filters to post-scan.
pub const SORT_COST_THRESHOLD: f64 = 1000.0;

/// Fixed page indices reserved before the schema table may claim its own root.
pub const HEADER_PAGE_IDX: u32 = 0;
pub const SCHEMA_ROOT_PAGE_IDX: u32 = 1;

pub const DB_MAGIC: &[u8; 8] = b"ashdbv1\0";
pub const JOURNAL_MAGIC: &[u8; 8] = b"minisql\n";
pub const JOURNAL_VERSION: u32 = 1;
pub const JOURNAL_COMMIT_MARKER: u32 = 0xDEAD_BEEF;

pub const SCHEMA_TABLE_NAME: &str = "minisql_schema";
