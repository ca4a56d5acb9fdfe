use std::{fs::File, path::PathBuf, pin::Pin};

use csv::StringRecord;
use futures::Stream;

#[derive(thiserror::Error, Debug)]
pub enum RegionListError {
    #[error("failed to open region list: {0}")]
    Open(#[from] std::io::Error),
    #[error("failed to read region list header: {0}")]
    Header(#[source] csv::Error),
    #[error("skipped unreadable region list entry: {0}")]
    Record(#[source] csv::Error),
}

impl RegionListError {
    /// Whether the stream ends after this error. A bad record only costs
    /// that record.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Open(_) | Self::Header(_) => true,
            Self::Record(e) => matches!(e.kind(), csv::ErrorKind::Io(_)),
        }
    }
}

/// CSV list of region names for the batch refresh.
///
/// Uses the `region` column when the header has one, otherwise the first
/// column. Blank names and lines starting with `#` are skipped.
pub struct RegionListFile {
    path: PathBuf,
}

impl RegionListFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Regions in file order. Unreadable records are yielded as
    /// [`RegionListError::Record`] and reading continues with the next one.
    pub fn stream(&self) -> Pin<Box<dyn Stream<Item = Result<String, RegionListError>> + Send>> {
        // Blocking reads inside the stream; region lists are a few hundred lines.
        let path = self.path.clone();
        let s = async_stream::stream! {
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => {
                    yield Err(RegionListError::Open(e));
                    return;
                }
            };
            let mut rdr = csv::ReaderBuilder::new()
                .comment(Some(b'#'))
                .trim(csv::Trim::All)
                .flexible(true)
                .from_reader(file);
            let column = match rdr.headers() {
                Ok(headers) => region_column(headers),
                Err(e) => {
                    yield Err(RegionListError::Header(e));
                    return;
                }
            };

            for result in rdr.records() {
                match result {
                    Ok(record) => {
                        if let Some(region) = region_name(&record, column) {
                            yield Ok(region);
                        }
                    }
                    Err(e) => {
                        let err = RegionListError::Record(e);
                        let fatal = err.is_fatal();
                        yield Err(err);
                        if fatal {
                            return;
                        }
                    }
                }
            }
        };

        Box::pin(s)
    }
}

fn region_column(headers: &StringRecord) -> usize {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("region") || h.eq_ignore_ascii_case("comuna"))
        .unwrap_or(0)
}

fn region_name(record: &StringRecord, column: usize) -> Option<String> {
    record
        .get(column)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
