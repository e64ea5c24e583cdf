//! CSV capture recordings
//!
//! The capture firmware prints each capture as a `Time(ms),Voltage(V)`
//! header followed by one `time,voltage` line per sample, surrounded by
//! free-form status lines. [`RecordingSource`] replays such a log as an
//! [`Acquisition`]; [`RecordingWriter`] produces the same format.

use ecg_core::{acquisition_error, Acquisition, AdcSpec, EcgError, EcgResult, SampleBlock, Voltage};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Column header printed before every capture
pub const RECORDING_HEADER: &str = "Time(ms),Voltage(V)";

const RECORDING_COLUMNS: [&str; 2] = ["Time(ms)", "Voltage(V)"];

fn format_error(error: csv::Error) -> EcgError {
    EcgError::RecordingFormat {
        line: error.position().map_or(0, |p| p.line() as usize),
        reason: error.to_string(),
    }
}

/// Parse a recording, keeping only the voltage column
///
/// Status lines (anything not starting with a digit or sign) are skipped.
/// A line that looks like data but does not parse is an error.
pub fn parse_recording<R: Read>(reader: R) -> EcgResult<Vec<Voltage>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut voltages = Vec::new();
    for result in reader.records() {
        let record = result.map_err(format_error)?;
        let line_no = record.position().map_or(0, |p| p.line() as usize);

        let first = record.get(0).unwrap_or_default();
        let looks_like_data = first
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_digit() || c == '-' || c == '.');
        if !looks_like_data {
            if !first.is_empty() && record.iter().ne(RECORDING_COLUMNS) {
                debug!(line = line_no, text = first, "skipping status line");
            }
            continue;
        }

        if record.len() != 2 {
            return Err(EcgError::RecordingFormat {
                line: line_no,
                reason: format!("expected two columns, got {}", record.len()),
            });
        }

        let (time, voltage) = (&record[0], &record[1]);
        time.parse::<f64>().map_err(|e| EcgError::RecordingFormat {
            line: line_no,
            reason: format!("bad time '{}': {}", time, e),
        })?;
        let voltage = voltage.parse::<f32>().map_err(|e| EcgError::RecordingFormat {
            line: line_no,
            reason: format!("bad voltage '{}': {}", voltage, e),
        })?;

        voltages.push(voltage);
    }

    Ok(voltages)
}

/// Replays a recorded capture block by block
pub struct RecordingSource {
    name: String,
    voltages: Vec<Voltage>,
    adc: AdcSpec,
    position: usize,
    looping: bool,
    realtime_pacing: bool,
    next_time_ms: f64,
    sequence: u64,
}

impl RecordingSource {
    pub fn new(name: impl Into<String>, voltages: Vec<Voltage>, adc: AdcSpec) -> EcgResult<Self> {
        if voltages.is_empty() {
            return Err(acquisition_error!("recording contains no samples"));
        }
        Ok(Self {
            name: name.into(),
            voltages,
            adc,
            position: 0,
            looping: false,
            realtime_pacing: false,
            next_time_ms: 0.0,
            sequence: 0,
        })
    }

    /// Open a CSV recording from disk
    pub fn open(path: impl AsRef<Path>, adc: AdcSpec) -> EcgResult<Self> {
        let path = path.as_ref();
        let voltages = parse_recording(File::open(path)?)?;
        info!(path = %path.display(), samples = voltages.len(), "recording loaded");

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());
        Self::new(name, voltages, adc)
    }

    /// Wrap around to the start instead of failing at the end
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Block for as long as the real capture took
    pub fn realtime_pacing(mut self, pacing: bool) -> Self {
        self.realtime_pacing = pacing;
        self
    }

    pub fn len(&self) -> usize {
        self.voltages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltages.is_empty()
    }

    /// Samples not yet replayed
    pub fn remaining(&self) -> usize {
        self.voltages.len() - self.position
    }

    pub fn voltages(&self) -> &[Voltage] {
        &self.voltages
    }
}

impl Acquisition for RecordingSource {
    fn acquire_block(&mut self, capacity: usize, sample_period_ms: f64) -> EcgResult<SampleBlock> {
        if !self.looping && self.remaining() < capacity {
            return Err(acquisition_error!(
                "{} exhausted: {} samples left, block needs {}",
                self.name,
                self.remaining(),
                capacity
            ));
        }

        let mut counts = Vec::with_capacity(capacity);
        while counts.len() < capacity {
            if self.position == self.voltages.len() {
                self.position = 0;
            }
            counts.push(self.adc.quantize(self.voltages[self.position]).value());
            self.position += 1;
        }

        let block = SampleBlock::from_counts(&counts, &self.adc, self.next_time_ms, sample_period_ms, self.sequence)?;
        self.next_time_ms = block.end_time_ms();
        self.sequence += 1;

        if self.realtime_pacing {
            std::thread::sleep(Duration::from_secs_f64(block.duration_ms() / 1000.0));
        }
        Ok(block)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writes blocks in the capture log format
pub struct RecordingWriter<W: Write> {
    writer: csv::Writer<W>,
    adc: AdcSpec,
    samples_written: usize,
}

impl RecordingWriter<File> {
    /// Create a recording file, truncating any existing one
    pub fn create(path: impl AsRef<Path>, adc: AdcSpec) -> EcgResult<Self> {
        Self::new(File::create(path)?, adc)
    }
}

impl<W: Write> RecordingWriter<W> {
    pub fn new(writer: W, adc: AdcSpec) -> EcgResult<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(RECORDING_COLUMNS)
            .map_err(|e| EcgError::Io(e.into()))?;
        Ok(Self {
            writer,
            adc,
            samples_written: 0,
        })
    }

    /// Append every sample of `block`
    pub fn write_block(&mut self, block: &SampleBlock) -> EcgResult<()> {
        for (i, voltage) in block.voltages(&self.adc).enumerate() {
            let time = format!("{:.1}", block.timestamp_ms(i));
            let voltage = format!("{:.3}", voltage);
            self.writer
                .write_record([time.as_str(), voltage.as_str()])
                .map_err(|e| EcgError::Io(e.into()))?;
        }
        self.samples_written += block.len();
        Ok(())
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> EcgResult<W> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| EcgError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FIRMWARE_LOG: &str = "\
Starting new capture at 1000 Hz for 5 samples...
Time(ms),Voltage(V)
0.0,1.650
1.0,1.700
2.0,2.900
3.0,1.600
4.0,1.640
Capture complete, 5 samples

";

    #[test]
    fn test_parse_firmware_log() {
        let voltages = parse_recording(Cursor::new(FIRMWARE_LOG)).unwrap();
        assert_eq!(voltages, vec![1.65, 1.7, 2.9, 1.6, 1.64]);
    }

    #[test]
    fn test_parse_windows_line_endings_and_padding() {
        let log = "Time(ms),Voltage(V)\r\n0.0, 1.650\r\n1.0 ,1.700\r\nCapture complete\r\n";
        let voltages = parse_recording(Cursor::new(log)).unwrap();
        assert_eq!(voltages, vec![1.65, 1.7]);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let log = "Time(ms),Voltage(V)\n0.0,1.650\n1.0,abc\n";
        let error = parse_recording(Cursor::new(log)).unwrap_err();
        assert!(matches!(error, EcgError::RecordingFormat { line: 3, .. }));

        let log = "0.0,1.650,7\n";
        assert!(parse_recording(Cursor::new(log)).is_err());
    }

    #[test]
    fn test_replay_blocks_and_exhaustion() {
        let voltages = parse_recording(Cursor::new(FIRMWARE_LOG)).unwrap();
        let mut source = RecordingSource::new("log", voltages, AdcSpec::default()).unwrap();

        let block = source.acquire_block(4, 1.0).unwrap();
        assert_eq!(block.len(), 4);
        assert_eq!(block.samples()[0].value(), 2048);
        assert_eq!(source.remaining(), 1);

        let error = source.acquire_block(4, 1.0).unwrap_err();
        assert!(matches!(error, EcgError::AcquisitionFailed { .. }));
    }

    #[test]
    fn test_looping_replay() {
        let mut source = RecordingSource::new("loop", vec![0.0, 3.3], AdcSpec::default())
            .unwrap()
            .looping(true);

        let first = source.acquire_block(3, 1.0).unwrap();
        let second = source.acquire_block(3, 1.0).unwrap();
        let counts: Vec<u16> = first.samples().iter().chain(second.samples()).map(|s| s.value()).collect();

        assert_eq!(counts, vec![0, 4095, 0, 4095, 0, 4095]);
        assert_eq!(second.start_time_ms(), 3.0);
        assert_eq!(second.sequence(), 1);
    }

    #[test]
    fn test_empty_recording_is_rejected() {
        assert!(RecordingSource::new("empty", vec![], AdcSpec::default()).is_err());
    }

    #[test]
    fn test_writer_output_parses_back() {
        let adc = AdcSpec::default();
        let block = SampleBlock::from_counts(&[2048, 3000, 1000], &adc, 10.0, 1.0, 0).unwrap();

        let mut writer = RecordingWriter::new(Vec::new(), adc).unwrap();
        writer.write_block(&block).unwrap();
        assert_eq!(writer.samples_written(), 3);
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(RECORDING_HEADER));
        assert_eq!(lines.next(), Some("10.0,1.650"));

        let voltages = parse_recording(Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(voltages.len(), 3);
        assert!((voltages[1] - adc.to_voltage(block.samples()[1])).abs() < 0.001);
    }
}
