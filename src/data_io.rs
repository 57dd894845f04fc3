use std::fs::File;
use std::io::{self, Write};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{DataFormat, RetainedItem};

const CSV_HEADERS: [&str; 8] = [
    "text",
    "author",
    "timestamp",
    "is_thread",
    "thread_position",
    "thread_text",
    "quoted_url",
    "media_urls",
];

const UNKNOWN_FIELD: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportRecord {
    text: String,
    author: String,
    timestamp: String,
    is_thread: bool,
    thread_position: Option<usize>,
    thread_text: String,
    quoted_url: String,
    media_urls: Vec<String>,
}

fn item_to_export_record(item: &RetainedItem) -> ExportRecord {
    ExportRecord {
        text: item.text.clone(),
        author: item
            .author
            .clone()
            .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
        timestamp: item
            .timestamp
            .clone()
            .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
        is_thread: item.is_thread,
        thread_position: item.thread_position,
        thread_text: item
            .thread_items
            .as_deref()
            .map(|items| items.join("|"))
            .unwrap_or_default(),
        quoted_url: item.quoted_url.clone().unwrap_or_default(),
        media_urls: item.media_urls.clone(),
    }
}

fn export_fields(rec: &ExportRecord) -> [String; 8] {
    [
        rec.text.clone(),
        rec.author.clone(),
        rec.timestamp.clone(),
        rec.is_thread.to_string(),
        rec.thread_position
            .map(|pos| pos.to_string())
            .unwrap_or_default(),
        rec.thread_text.clone(),
        rec.quoted_url.clone(),
        rec.media_urls.join("|"),
    ]
}

pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn new(output_path: &str) -> io::Result<Self> {
        let file = File::create(output_path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADERS)?;
        Ok(Self { writer })
    }

    pub fn write_item(&mut self, item: &RetainedItem) -> io::Result<()> {
        let rec = item_to_export_record(item);
        self.writer.write_record(export_fields(&rec))?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub struct JsonSink {
    file: File,
    first: bool,
    closed: bool,
}

impl JsonSink {
    pub fn new(output_path: &str) -> io::Result<Self> {
        let mut file = File::create(output_path)?;
        file.write_all(b"[\n")?;
        Ok(Self {
            file,
            first: true,
            closed: false,
        })
    }

    pub fn write_item(&mut self, item: &RetainedItem) -> io::Result<()> {
        let rec = item_to_export_record(item);
        if !self.first {
            self.file.write_all(b",\n")?;
        }
        self.first = false;
        serde_json::to_writer(&mut self.file, &rec).map_err(io::Error::other)?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    pub fn finalize(&mut self) -> io::Result<()> {
        if !self.closed {
            if self.first {
                self.file.write_all(b"]\n")?;
            } else {
                self.file.write_all(b"\n]\n")?;
            }
            self.closed = true;
        }
        self.file.flush()
    }
}

impl Drop for JsonSink {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

pub enum OutputSink {
    Csv(CsvSink),
    Json(JsonSink),
}

impl OutputSink {
    pub fn new(output_path: &str, format: DataFormat) -> io::Result<Self> {
        match format {
            DataFormat::Csv => Ok(OutputSink::Csv(CsvSink::new(output_path)?)),
            DataFormat::Json => Ok(OutputSink::Json(JsonSink::new(output_path)?)),
        }
    }

    pub fn write_item(&mut self, item: &RetainedItem) -> io::Result<()> {
        match self {
            OutputSink::Csv(sink) => sink.write_item(item),
            OutputSink::Json(sink) => sink.write_item(item),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Csv(sink) => sink.flush(),
            OutputSink::Json(sink) => sink.flush(),
        }
    }

    pub fn finalize(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Csv(sink) => sink.flush(),
            OutputSink::Json(sink) => sink.finalize(),
        }
    }
}

pub fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else {
        fallback
    }
}

pub fn default_output_path(base_url: &str, format: DataFormat) -> String {
    let host = Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "timeline".to_string());
    let host = host
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    match format {
        DataFormat::Csv => format!("{host}_{ts}.csv"),
        DataFormat::Json => format!("{host}_{ts}.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> RetainedItem {
        RetainedItem {
            text: "a post saying \"hello\"".to_string(),
            timestamp: Some("2024-01-15T10:30:00.000Z".to_string()),
            author: None,
            is_thread: true,
            thread_items: Some(vec!["first".to_string(), "second".to_string()]),
            thread_position: Some(2),
            quoted_url: None,
            media_urls: vec![
                "https://pbs.twimg.com/a.jpg".to_string(),
                "https://pbs.twimg.com/b.jpg".to_string(),
            ],
        }
    }

    #[test]
    fn missing_fields_fall_back_to_unknown() {
        let rec = item_to_export_record(&item());
        assert_eq!(rec.author, "Unknown");
        assert_eq!(rec.timestamp, "2024-01-15T10:30:00.000Z");
    }

    #[test]
    fn thread_and_media_fields_are_pipe_joined() {
        let fields = export_fields(&item_to_export_record(&item()));
        assert_eq!(fields[3], "true");
        assert_eq!(fields[4], "2");
        assert_eq!(fields[5], "first|second");
        assert_eq!(fields[7], "https://pbs.twimg.com/a.jpg|https://pbs.twimg.com/b.jpg");
    }

    #[test]
    fn embedded_quotes_are_doubled_in_csv_output() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADERS).unwrap();
        writer
            .write_record(export_fields(&item_to_export_record(&item())))
            .unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(out.contains("\"a post saying \"\"hello\"\"\""));
    }

    #[test]
    fn singleton_fields_stay_empty() {
        let single = RetainedItem {
            text: "plain".to_string(),
            timestamp: None,
            author: Some("someone".to_string()),
            is_thread: false,
            thread_items: None,
            thread_position: None,
            quoted_url: None,
            media_urls: Vec::new(),
        };
        let fields = export_fields(&item_to_export_record(&single));
        assert_eq!(fields[2], "Unknown");
        assert_eq!(fields[3], "false");
        assert_eq!(fields[4], "");
        assert_eq!(fields[5], "");
        assert_eq!(fields[6], "");
        assert_eq!(fields[7], "");
    }

    #[test]
    fn format_detection_prefers_extension() {
        assert_eq!(
            detect_data_format("out.json", DataFormat::Csv),
            DataFormat::Json
        );
        assert_eq!(
            detect_data_format("out.csv", DataFormat::Json),
            DataFormat::Csv
        );
        assert_eq!(
            detect_data_format("out.dat", DataFormat::Json),
            DataFormat::Json
        );
    }

    #[test]
    fn default_path_uses_host_slug() {
        let path = default_output_path("https://x.com/home", DataFormat::Csv);
        assert!(path.starts_with("x_com_"));
        assert!(path.ends_with(".csv"));
    }
}
