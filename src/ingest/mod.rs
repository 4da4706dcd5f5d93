//! Record Parser - streaming decode of the UCMR flat files
//!
//! ```text
//! UCMR5_All.txt ────────────┐
//! UCMR5_ZIPCodes.txt ───────┼─→ DelimitedReader (header arity check, latin-1)
//! UCMR5_AddtlDataElem.txt ──┘        ↓
//!                              RecordReader<T> → SampleRecord / ZipCodeRecord / AdditionalDataRecord
//! ```

pub mod reader;
pub mod records;
pub mod schema;

pub use reader::{parse_number, DelimitedReader, ParseStats, RecordReader, SourceRecord};
pub use records::{AdditionalDataRecord, ResultSign, SampleRecord, ZipCodeRecord};
pub use schema::FileSchema;

use tokio::fs::File;
use tokio::io::BufReader;

pub type SampleReader = RecordReader<BufReader<File>, SampleRecord>;
pub type ZipCodeReader = RecordReader<BufReader<File>, ZipCodeRecord>;
pub type AdditionalDataReader = RecordReader<BufReader<File>, AdditionalDataRecord>;
