//! Typed rows of the three source files

use super::reader::{FieldCursor, SourceRecord};
use super::schema::{self, additional_columns as ac, sample_columns as sc, zip_columns as zc, FileSchema};
use serde::{Deserialize, Serialize};

/// Analytical result qualifier from the samples file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultSign {
    /// `=`: the result value is an exact measurement
    Exact,
    /// `<`: below the method reporting limit, no exact value known
    BelowLimit,
    /// Empty or unrecognised qualifier
    Missing,
}

impl ResultSign {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "=" => Some(ResultSign::Exact),
            "<" => Some(ResultSign::BelowLimit),
            "" => Some(ResultSign::Missing),
            _ => None,
        }
    }

    /// Symbol stored in the relational snapshot; `None` maps to NULL
    pub fn as_symbol(&self) -> Option<&'static str> {
        match self {
            ResultSign::Exact => Some("="),
            ResultSign::BelowLimit => Some("<"),
            ResultSign::Missing => None,
        }
    }
}

/// One line of the samples file
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub pwsid: String,
    pub pws_name: String,
    pub state: String,
    pub epa_region: Option<i64>,
    pub contaminant: String,
    pub result_value: Option<f64>,
    pub result_sign: ResultSign,
    pub mrl: Option<f64>,
    pub units: String,
    pub collection_date: String,
    pub sample_id: String,
    pub facility_id: String,
    pub facility_name: String,
    pub sample_point_id: String,
    pub sample_point_name: String,
    pub size: String,
    pub monitoring_requirement: String,
    pub method_id: String,
}

impl SourceRecord for SampleRecord {
    const SCHEMA: FileSchema = schema::SAMPLES;

    fn from_fields(f: &mut FieldCursor) -> Self {
        let sign_raw = f.text(sc::RESULT_SIGN);
        let result_sign = ResultSign::parse(&sign_raw).unwrap_or_else(|| {
            f.mark_malformed();
            ResultSign::Missing
        });

        Self {
            pwsid: f.text(sc::PWSID),
            pws_name: f.text(sc::PWS_NAME),
            state: f.text(sc::STATE),
            epa_region: f.integer(sc::EPA_REGION),
            contaminant: f.text(sc::CONTAMINANT),
            result_value: f.number(sc::RESULT_VALUE),
            result_sign,
            mrl: f.number(sc::MRL),
            units: f.text(sc::UNITS),
            collection_date: f.text(sc::COLLECTION_DATE),
            sample_id: f.text(sc::SAMPLE_ID),
            facility_id: f.text(sc::FACILITY_ID),
            facility_name: f.text(sc::FACILITY_NAME),
            sample_point_id: f.text(sc::SAMPLE_POINT_ID),
            sample_point_name: f.text(sc::SAMPLE_POINT_NAME),
            size: f.text(sc::SIZE),
            monitoring_requirement: f.text(sc::MONITORING_REQUIREMENT),
            method_id: f.text(sc::METHOD_ID),
        }
    }
}

/// One facility → zip code pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipCodeRecord {
    pub pwsid: String,
    pub zip_code: String,
}

impl SourceRecord for ZipCodeRecord {
    const SCHEMA: FileSchema = schema::ZIP_CODES;

    fn from_fields(f: &mut FieldCursor) -> Self {
        Self {
            pwsid: f.text(zc::PWSID),
            zip_code: f.text(zc::ZIP_CODE),
        }
    }
}

/// One supplementary data-element response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDataRecord {
    pub pwsid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_point_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_event_code: Option<String>,
    pub data_element: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_text: Option<String>,
}

impl SourceRecord for AdditionalDataRecord {
    const SCHEMA: FileSchema = schema::ADDITIONAL_DATA;

    fn from_fields(f: &mut FieldCursor) -> Self {
        Self {
            pwsid: f.text(ac::PWSID),
            facility_id: f.optional_text(ac::FACILITY_ID),
            sample_point_id: f.optional_text(ac::SAMPLE_POINT_ID),
            sample_event_code: f.optional_text(ac::SAMPLE_EVENT_CODE),
            data_element: f.text(ac::DATA_ELEMENT),
            response: f.text(ac::RESPONSE),
            other_text: f.optional_text(ac::OTHER_TEXT),
        }
    }
}
