//! Decoded line-number programs.

/// One entry of a line table's file-name table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFile
{
    /// File path as written in the table, without the directory prefix
    pub path: String,
    /// Index into the include-directory table
    pub directory_index: u64,
}

impl LineFile
{
    pub fn new(path: impl Into<String>, directory_index: u64) -> Self
    {
        Self {
            path: path.into(),
            directory_index,
        }
    }
}

/// One row of the line-number matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRow
{
    pub address: u64,
    pub file: u64,
    pub line: u64,
    /// Row produced by `DW_LNE_end_sequence`
    pub end_sequence: bool,
}

impl LineRow
{
    pub const fn new(address: u64, file: u64, line: u64) -> Self
    {
        Self {
            address,
            file,
            line,
            end_sequence: false,
        }
    }

    pub const fn end_sequence(address: u64, file: u64) -> Self
    {
        Self {
            address,
            file,
            line: 0,
            end_sequence: true,
        }
    }
}

/// A decoded line-number program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineTable
{
    /// Offset of the program in `.debug_line`
    pub offset: u64,
    pub version: u16,
    /// Include-directory table; for DWARF 5 entry 0 is the compilation
    /// directory
    pub include_directories: Vec<String>,
    pub file_names: Vec<LineFile>,
    /// Rows in program order
    pub rows: Vec<LineRow>,
}

impl LineTable
{
    /// Is `index` a valid file index for this table's version?
    ///
    /// Before DWARF 5 file indices are 1-based; from DWARF 5 on, 0 names the
    /// primary source file.
    ///
    /// ```rust
    /// use dwarfck_core::types::{LineFile, LineTable};
    ///
    /// let table = LineTable {
    ///     version: 4,
    ///     file_names: vec![LineFile::new("a.c", 0)],
    ///     ..LineTable::default()
    /// };
    /// assert!(!table.has_file_at_index(0));
    /// assert!(table.has_file_at_index(1));
    /// ```
    pub fn has_file_at_index(&self, index: u64) -> bool
    {
        let count = self.file_names.len() as u64;
        if self.version >= 5 {
            index < count
        } else {
            index != 0 && index <= count
        }
    }

    /// Path of `file` joined onto its include directory and `comp_dir`
    ///
    /// Directory index 0 names the compilation directory before DWARF 5.
    /// An index outside the table leaves the path relative.
    pub fn full_path(&self, file: &LineFile, comp_dir: Option<&str>) -> String
    {
        if file.path.starts_with('/') {
            return file.path.clone();
        }
        let directory = if self.version < 5 && file.directory_index == 0 {
            comp_dir
        } else {
            let index = if self.version < 5 { file.directory_index - 1 } else { file.directory_index };
            usize::try_from(index)
                .ok()
                .and_then(|index| self.include_directories.get(index))
                .map(String::as_str)
        };
        let Some(directory) = directory else {
            return file.path.clone();
        };
        let directory = match comp_dir {
            Some(comp_dir) if !directory.starts_with('/') && directory != comp_dir => format!("{comp_dir}/{directory}"),
            _ => directory.to_string(),
        };
        format!("{}/{}", directory.trim_end_matches('/'), file.path)
    }

    /// Valid file indices as an inclusive range, for diagnostics
    ///
    /// Returns `None` for an empty file table.
    pub fn file_index_bounds(&self) -> Option<(u64, u64)>
    {
        let count = self.file_names.len() as u64;
        if count == 0 {
            return None;
        }
        if self.version >= 5 {
            Some((0, count - 1))
        } else {
            Some((1, count))
        }
    }
}
