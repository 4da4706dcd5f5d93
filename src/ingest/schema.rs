//! Column contract with the upstream data provider
//!
//! Every positional index the pipeline reads lives here. Headers are not
//! resolved by name; only their field count is checked against `arity`.

/// Fixed layout of one tab-delimited source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSchema {
    pub name: &'static str,
    pub arity: usize,
}

pub const DELIMITER: u8 = b'\t';

pub const SAMPLES: FileSchema = FileSchema {
    name: "samples",
    arity: 24,
};

pub const ZIP_CODES: FileSchema = FileSchema {
    name: "zip codes",
    arity: 2,
};

pub const ADDITIONAL_DATA: FileSchema = FileSchema {
    name: "additional data",
    arity: 7,
};

/// Positions in the samples file. Columns 5, 6, 12 and 18-20 are unused.
pub mod sample_columns {
    pub const PWSID: usize = 0;
    pub const PWS_NAME: usize = 1;
    pub const STATE: usize = 2;
    pub const EPA_REGION: usize = 3;
    pub const CONTAMINANT: usize = 4;
    pub const RESULT_VALUE: usize = 7;
    pub const RESULT_SIGN: usize = 8;
    pub const MRL: usize = 9;
    pub const UNITS: usize = 10;
    pub const COLLECTION_DATE: usize = 11;
    pub const SAMPLE_ID: usize = 13;
    pub const FACILITY_ID: usize = 14;
    pub const FACILITY_NAME: usize = 15;
    pub const SAMPLE_POINT_ID: usize = 16;
    pub const SAMPLE_POINT_NAME: usize = 17;
    pub const SIZE: usize = 21;
    pub const MONITORING_REQUIREMENT: usize = 22;
    pub const METHOD_ID: usize = 23;
}

pub mod zip_columns {
    pub const PWSID: usize = 0;
    pub const ZIP_CODE: usize = 1;
}

pub mod additional_columns {
    pub const PWSID: usize = 0;
    pub const FACILITY_ID: usize = 1;
    pub const SAMPLE_POINT_ID: usize = 2;
    pub const SAMPLE_EVENT_CODE: usize = 3;
    pub const DATA_ELEMENT: usize = 4;
    pub const RESPONSE: usize = 5;
    pub const OTHER_TEXT: usize = 6;
}
