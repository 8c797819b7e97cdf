use crate::acquisition::AcquisitionSession;
use crate::frame_decoder::{DebugSample, FilteredSample};
use polars::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const INDEX_COLUMN_NAME: &str = "index";
const RAW_COLUMN_NAME: &str = "raw";
const ADC_COLUMN_NAME: &str = "adc";
const VALUE_COLUMN_NAME: &str = "value";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DataFrame error: {0}")]
    Polars(#[from] PolarsError),
}

/// Renders a finished session. Returns the number of samples written.
pub trait SessionSink<S> {
    fn emit(&mut self, session: &AcquisitionSession<S>) -> Result<usize, SinkError>;
}

/// `Sample <i>: Raw=0x<HHHH>, ADC=<d>`
pub fn format_debug_line(index: usize, sample: &DebugSample) -> String {
    format!(
        "Sample {}: Raw=0x{:04X}, ADC={}",
        index, sample.raw, sample.adc
    )
}

/// One line per raw-debug sample.
#[derive(Debug)]
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SessionSink<DebugSample> for ConsoleSink<W> {
    fn emit(&mut self, session: &AcquisitionSession<DebugSample>) -> Result<usize, SinkError> {
        for (i, sample) in session.iter().enumerate() {
            writeln!(self.out, "{}", format_debug_line(i, sample))?;
        }
        self.out.flush()?;
        Ok(session.len())
    }
}

/// One decimal value per line, in capture order.
#[derive(Debug)]
pub struct DecimalLineSink<W: Write> {
    out: W,
}

impl DecimalLineSink<BufWriter<File>> {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        log::debug!("Writing samples to {}", path.display());
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> DecimalLineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SessionSink<FilteredSample> for DecimalLineSink<W> {
    fn emit(&mut self, session: &AcquisitionSession<FilteredSample>) -> Result<usize, SinkError> {
        for sample in session {
            writeln!(self.out, "{}", sample.value())?;
        }
        self.out.flush()?;
        log::info!("Saved {} samples", session.len());
        Ok(session.len())
    }
}

/// Tabular view of a session for analysis.
pub trait SessionFrame {
    fn to_dataframe(&self) -> Result<DataFrame, SinkError>;
}

fn index_column(len: usize) -> Column {
    let index: Vec<u32> = (0..len as u32).collect();
    Series::new(INDEX_COLUMN_NAME.into(), index).into()
}

impl SessionFrame for AcquisitionSession<DebugSample> {
    fn to_dataframe(&self) -> Result<DataFrame, SinkError> {
        let raw: Vec<u32> = self.iter().map(|s| u32::from(s.raw)).collect();
        let adc: Vec<u32> = self.iter().map(|s| u32::from(s.adc)).collect();

        Ok(DataFrame::new(vec![
            index_column(self.len()),
            Series::new(RAW_COLUMN_NAME.into(), raw).into(),
            Series::new(ADC_COLUMN_NAME.into(), adc).into(),
        ])?)
    }
}

impl SessionFrame for AcquisitionSession<FilteredSample> {
    fn to_dataframe(&self) -> Result<DataFrame, SinkError> {
        let values: Vec<u32> = self.iter().map(|s| u32::from(s.value())).collect();

        Ok(DataFrame::new(vec![
            index_column(self.len()),
            Series::new(VALUE_COLUMN_NAME.into(), values).into(),
        ])?)
    }
}
