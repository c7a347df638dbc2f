pub(crate) const OS_PATH_SEPARATOR: u8 = b'/';

// Only absolute paths in canonical form can be matched against rules: no
// empty, "." or ".." components. A single trailing separator is tolerated.
pub(crate) fn path_is_sane(path: &[u8]) -> bool {
    let body = match path.split_first() {
        Some((&OS_PATH_SEPARATOR, rest)) => rest,
        _ => return false,
    };
    let body = body.strip_suffix(&[OS_PATH_SEPARATOR]).unwrap_or(body);
    if body.is_empty() {
        return true;
    }
    body.split(|&b| b == OS_PATH_SEPARATOR)
        .all(|component| !component.is_empty() && component != b"." && component != b"..")
}

// Examples:
// /a/b/c -> /a/b
// /a/b -> /a
// /a -> "" (the root directory)
// "" -> None
pub(crate) fn strip_one_component(path: &[u8]) -> Option<&[u8]> {
    if path.is_empty() {
        return None;
    }
    path.iter()
        .rposition(|&b| b == OS_PATH_SEPARATOR)
        .map(|pos| &path[..pos])
}

pub(crate) fn strip_trailing_separator(path: &[u8]) -> &[u8] {
    match path.strip_suffix(&[OS_PATH_SEPARATOR]) {
        Some(rest) => rest,
        None => path,
    }
}
