use wherry_proto::{FileAttr, FileMode};

/// Renders the human-readable "long name" carried in NAME replies for
/// directory listings.  The format loosely follows `ls -l`; clients treat it
/// as advisory text.
pub fn long_name(name: &str, attr: &FileAttr) -> String {
    let mode = FileMode::from_bits_truncate(attr.permissions.unwrap_or(0));
    format!(
        "{} {:>3} {:<8} {:<8} {:>8} {}",
        mode_string(mode),
        1,
        attr.uid.unwrap_or(0),
        attr.gid.unwrap_or(0),
        attr.size.unwrap_or(0),
        name,
    )
}

/// The ten-character type-and-permissions column.
pub fn mode_string(mode: FileMode) -> String {
    let bits = mode.bits();
    let mut out = String::with_capacity(10);
    out.push(type_char(mode));
    out.push(if bits & 0o400 != 0 { 'r' } else { '-' });
    out.push(if bits & 0o200 != 0 { 'w' } else { '-' });
    out.push(exec_char(bits & 0o100 != 0, bits & 0o4000 != 0, 's', 'S'));
    out.push(if bits & 0o040 != 0 { 'r' } else { '-' });
    out.push(if bits & 0o020 != 0 { 'w' } else { '-' });
    out.push(exec_char(bits & 0o010 != 0, bits & 0o2000 != 0, 's', 'S'));
    out.push(if bits & 0o004 != 0 { 'r' } else { '-' });
    out.push(if bits & 0o002 != 0 { 'w' } else { '-' });
    out.push(exec_char(bits & 0o001 != 0, bits & 0o1000 != 0, 't', 'T'));
    out
}

fn type_char(mode: FileMode) -> char {
    let ty = mode & FileMode::IFMT;
    if ty == FileMode::IFDIR {
        'd'
    } else if ty == FileMode::IFLNK {
        'l'
    } else if ty == FileMode::IFBLK {
        'b'
    } else if ty == FileMode::IFCHR {
        'c'
    } else if ty == FileMode::IFSOCK {
        's'
    } else if ty == FileMode::IFIFO {
        'p'
    } else {
        '-'
    }
}

fn exec_char(exec: bool, special: bool, with_exec: char, without_exec: char) -> char {
    match (exec, special) {
        (true, true) => with_exec,
        (false, true) => without_exec,
        (true, false) => 'x',
        (false, false) => '-',
    }
}

#[cfg(test)]
mod tests {
    use super::{long_name, mode_string};
    use wherry_proto::{FileAttr, FileMode};

    fn mode(bits: u32) -> FileMode {
        FileMode::from_bits_truncate(bits)
    }

    #[test]
    fn mode_strings() {
        assert_eq!(mode_string(mode(0o100644)), "-rw-r--r--");
        assert_eq!(mode_string(mode(0o040755)), "drwxr-xr-x");
        assert_eq!(mode_string(mode(0o120777)), "lrwxrwxrwx");
        assert_eq!(mode_string(mode(0o104755)), "-rwsr-xr-x");
        assert_eq!(mode_string(mode(0o102655)), "-rw-r-sr-x");
        assert_eq!(mode_string(mode(0o101644)), "-rw-r--r-T");
        assert_eq!(mode_string(mode(0o101645)), "-rw-r--r-t");
        assert_eq!(mode_string(mode(0o010600)), "prw-------");
    }

    #[test]
    fn listing_line() {
        let attr = FileAttr {
            size: Some(1234),
            uid: Some(1000),
            gid: Some(100),
            permissions: Some(0o100644),
            ..Default::default()
        };
        let line = long_name("notes.txt", &attr);
        assert!(line.starts_with("-rw-r--r--"), "line: {}", line);
        assert!(line.ends_with(" notes.txt"), "line: {}", line);
        assert!(line.contains("1234"), "line: {}", line);
        assert!(line.contains("1000"), "line: {}", line);
    }

    #[test]
    fn missing_attributes_default_to_zero() {
        let line = long_name("x", &FileAttr::default());
        assert!(line.starts_with("----------"), "line: {}", line);
        assert!(line.ends_with(" x"), "line: {}", line);
    }
}
