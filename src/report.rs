//! CSV output. A report type is any `Serialize` struct registered with [`define_report!`]; each
//! registered type gets its own file and every `send_report` call appends one row.
use std::any::TypeId;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use csv::Writer;

use crate::error::OutbreakError;
use crate::hashing::HashMap;

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), OutbreakError>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! define_report {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(
                &self,
                writer: &mut $crate::csv::Writer<std::fs::File>,
            ) -> Result<(), $crate::error::OutbreakError> {
                writer.serialize(self)?;
                Ok(())
            }
        }
    };
}
pub use define_report;

/// Where report files go and how they are named.
#[derive(Clone, Debug)]
pub struct ReportOptions {
    file_prefix: String,
    directory: PathBuf,
    overwrite: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            file_prefix: String::new(),
            directory: PathBuf::from("."),
            overwrite: false,
        }
    }
}

impl ReportOptions {
    #[must_use]
    pub fn new() -> Self {
        ReportOptions::default()
    }

    /// Prepended to every report's short name.
    pub fn file_prefix(&mut self, file_prefix: impl Into<String>) -> &mut Self {
        self.file_prefix = file_prefix.into();
        self
    }

    pub fn directory(&mut self, directory: impl Into<PathBuf>) -> &mut Self {
        self.directory = directory.into();
        self
    }

    /// Whether existing report files may be replaced.
    pub fn overwrite(&mut self, overwrite: bool) -> &mut Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn path_for(&self, short_name: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}.csv", self.file_prefix, short_name))
    }
}

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist. Returns the file if successful. Called by `add_report`
fn generate_validate_filepath(path: &Path, overwrite: bool) -> Result<File, OutbreakError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            if path.exists() && !overwrite {
                return Err(OutbreakError::ReportError(format!(
                    "{} already exists; pass overwrite to replace it",
                    path.display()
                )));
            }
            Ok(File::create(path)?)
        }
        _ => Err(OutbreakError::ReportError(
            "Report output files must be CSVs".to_string(),
        )),
    }
}

/// Owns one CSV writer per registered report type.
pub struct ReportWriter {
    options: ReportOptions,
    file_writers: HashMap<TypeId, Writer<File>>,
}

impl ReportWriter {
    #[must_use]
    pub fn new(options: ReportOptions) -> Self {
        ReportWriter {
            options,
            file_writers: HashMap::default(),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Creates `<directory>/<prefix><short_name>.csv` for report type `T`.
    ///
    /// # Errors
    ///
    /// Fails if `T` is already registered, the file exists and overwriting is off, or the
    /// file cannot be created.
    pub fn add_report<T: Report>(&mut self, short_name: &str) -> Result<PathBuf, OutbreakError> {
        let type_id = TypeId::of::<T>();
        if self.file_writers.contains_key(&type_id) {
            return Err(OutbreakError::ReportError(format!(
                "a report is already registered for `{short_name}`"
            )));
        }
        let path = self.options.path_for(short_name);
        let file = generate_validate_filepath(&path, self.options.overwrite)?;
        self.file_writers.insert(type_id, Writer::from_writer(file));
        Ok(path)
    }

    /// Write a new row with columns following items in the report struct
    /// to the report file associated with the report type struct.
    pub fn send_report<T: Report>(&mut self, report: &T) -> Result<(), OutbreakError> {
        let writer = self
            .file_writers
            .get_mut(&report.type_id())
            .ok_or_else(|| {
                OutbreakError::ReportError("No writer found for the report type".to_string())
            })?;
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OutbreakError> {
        for writer in self.file_writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
