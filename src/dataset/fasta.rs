use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::sequence::PlasmidRecord;

pub fn read_fasta(path: impl AsRef<Path>) -> io::Result<Vec<PlasmidRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("failed to open FASTA {}: {err}", path.display()),
        )
    })?;
    parse_fasta(BufReader::new(file))
}

/// Parse FASTA records. The id is the first whitespace-delimited token of
/// each header; sequence lines are concatenated and normalized.
pub fn parse_fasta<R: BufRead>(reader: R) -> io::Result<Vec<PlasmidRecord>> {
    let mut records = Vec::new();
    let mut current: Option<(String, String)> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if let Some(header) = line.strip_prefix('>') {
            if let Some((id, seq)) = current.take() {
                records.push(PlasmidRecord::new(id, seq));
            }
            let id = header.split_whitespace().next().unwrap_or_default();
            if id.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("empty FASTA header on line {}", line_no + 1),
                ));
            }
            current = Some((id.to_string(), String::new()));
        } else if line.trim().is_empty() || line.starts_with(';') {
            continue;
        } else {
            match current.as_mut() {
                Some((_, seq)) => seq.push_str(line.trim()),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("sequence data before first header on line {}", line_no + 1),
                    ));
                }
            }
        }
    }

    if let Some((id, seq)) = current {
        records.push(PlasmidRecord::new(id, seq));
    }

    Ok(records)
}

pub fn write_fasta<'a, I>(path: impl AsRef<Path>, records: I, line_width: usize) -> io::Result<()>
where
    I: IntoIterator<Item = &'a PlasmidRecord>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_records(&mut writer, records, line_width)?;
    writer.flush()
}

pub fn write_records<'a, W, I>(writer: &mut W, records: I, line_width: usize) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a PlasmidRecord>,
{
    if line_width == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "FASTA line width must be greater than zero",
        ));
    }

    for record in records {
        writeln!(writer, ">{}", record.id)?;
        if record.sequence.is_ascii() {
            for chunk in record.sequence.as_bytes().chunks(line_width) {
                writer.write_all(chunk)?;
                writer.write_all(b"\n")?;
            }
        } else {
            let chars: Vec<char> = record.sequence.chars().collect();
            for chunk in chars.chunks(line_width) {
                let line: String = chunk.iter().collect();
                writeln!(writer, "{line}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn parses_multiline_records() {
        let input = ">p1 pUC19 cloning vector\nACGT\nacgt\n\n>p2\nNNNN\n";
        let records = parse_fasta(Cursor::new(input)).expect("parse");
        assert_eq!(
            records,
            vec![
                PlasmidRecord::new("p1", "ACGTACGT"),
                PlasmidRecord::new("p2", "NNNN")
            ]
        );
    }

    #[test]
    fn rejects_sequence_before_header() {
        let err = parse_fasta(Cursor::new("ACGT\n>p1\nA\n")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn keeps_records_with_empty_sequences() {
        let records = parse_fasta(Cursor::new(">empty\n>p1\nAC\n")).expect("parse");
        assert_eq!(records.len(), 2);
        assert!(records[0].is_empty());
    }

    #[test]
    fn written_files_wrap_lines() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out.fasta");
        let records = vec![PlasmidRecord::new("p1", "ACGTACGTAC")];
        write_fasta(&path, &records, 4).expect("write");

        let text = fs::read_to_string(&path).expect("read back");
        assert_eq!(text, ">p1\nACGT\nACGT\nAC\n");
        assert_eq!(read_fasta(&path).expect("reparse"), records);
    }
}
