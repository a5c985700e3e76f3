//! Slug grammar and path arithmetic.
//!
//! A slug is `/` or `/` followed by one or more non-empty segments separated
//! by `/`. Normalised segments contain only `[a-z0-9._~-]`.

use crate::{Error, Result};

pub const ROOT: &str = "/";

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Turn a human-typed path into a well-formed slug.
///
/// Each segment is transliterated according to `locale`, lower-cased, and
/// stripped of illegal characters (runs of them become a single `-`).
/// Repeated separators collapse. A segment that had content but normalises
/// to nothing is rejected.
pub fn normalize(desired: &str, locale: &str) -> Result<String> {
  let german = is_german(locale);
  let mut segments = Vec::new();

  for raw in desired.split('/') {
    if raw.trim().is_empty() {
      continue;
    }
    let segment = normalize_segment(raw, german);
    if segment.is_empty() {
      return Err(Error::invalid(desired, "segment has no usable characters"));
    }
    if segment == "." || segment == ".." {
      return Err(Error::invalid(desired, "relative segments are not allowed"));
    }
    segments.push(segment);
  }

  Ok(join(&segments))
}

/// Normalise a single title into one segment (no `/` allowed in the output).
pub fn normalize_title(title: &str, locale: &str) -> Result<String> {
  let segment = normalize_segment(&title.replace('/', "-"), is_german(locale));
  match segment.as_str() {
    "" => Err(Error::invalid(title, "title has no usable characters")),
    "." | ".." => Err(Error::invalid(title, "relative segments are not allowed")),
    _ => Ok(segment),
  }
}

fn is_german(locale: &str) -> bool {
  let lang = locale.split(['-', '_']).next().unwrap_or_default();
  lang.eq_ignore_ascii_case("de")
}

fn normalize_segment(raw: &str, german: bool) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut pending_dash = false;

  for c in raw.chars() {
    let mapped = transliterate(c, german);
    for m in mapped.chars() {
      let m = m.to_ascii_lowercase();
      if m.is_ascii_alphanumeric() || matches!(m, '.' | '_' | '~') {
        if pending_dash && !out.is_empty() {
          out.push('-');
        }
        pending_dash = false;
        out.push(m);
      } else {
        pending_dash = true;
      }
    }
  }

  out
}

/// Map a character onto ASCII. Unknown non-ASCII characters map to a
/// separator.
fn transliterate(c: char, german: bool) -> std::borrow::Cow<'static, str> {
  use std::borrow::Cow;

  if c.is_ascii() {
    return Cow::Owned(c.to_string());
  }

  let s = match c {
    'ä' | 'Ä' if german => "ae",
    'ö' | 'Ö' if german => "oe",
    'ü' | 'Ü' if german => "ue",
    'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => "a",
    'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ą' => "a",
    'æ' | 'Æ' => "ae",
    'ç' | 'Ç' | 'ć' | 'Ć' | 'č' | 'Č' => "c",
    'ď' | 'Ď' | 'đ' | 'Đ' | 'ð' | 'Ð' => "d",
    'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
    'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => "e",
    'ì' | 'í' | 'î' | 'ï' | 'ī' => "i",
    'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => "i",
    'ł' | 'Ł' => "l",
    'ñ' | 'Ñ' | 'ń' | 'Ń' | 'ň' | 'Ň' => "n",
    'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => "o",
    'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' => "o",
    'œ' | 'Œ' => "oe",
    'ř' | 'Ř' => "r",
    'ś' | 'Ś' | 'š' | 'Š' => "s",
    'ß' | 'ẞ' => "ss",
    'ť' | 'Ť' => "t",
    'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => "u",
    'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' => "u",
    'ý' | 'ÿ' | 'Ý' => "y",
    'ź' | 'Ź' | 'ż' | 'Ż' | 'ž' | 'Ž' => "z",
    'þ' | 'Þ' => "th",
    _ => " ",
  };
  Cow::Borrowed(s)
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Check the structural well-formedness of an already-built slug.
pub fn validate(slug: &str) -> Result<()> {
  if !slug.starts_with('/') {
    return Err(Error::invalid(slug, "slug must start with '/'"));
  }
  if slug == ROOT {
    return Ok(());
  }
  if slug.ends_with('/') {
    return Err(Error::invalid(slug, "slug must not end with '/'"));
  }

  for segment in slug[1..].split('/') {
    if segment.is_empty() {
      return Err(Error::invalid(slug, "empty path segment"));
    }
    if segment == "." || segment == ".." {
      return Err(Error::invalid(slug, "relative segments are not allowed"));
    }
    if !segment
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    {
      return Err(Error::invalid(slug, "illegal character in path segment"));
    }
  }

  Ok(())
}

// ─── Path arithmetic ─────────────────────────────────────────────────────────

fn join(segments: &[String]) -> String {
  if segments.is_empty() {
    return ROOT.to_owned();
  }
  let mut out = String::new();
  for s in segments {
    out.push('/');
    out.push_str(s);
  }
  out
}

/// Number of segments; the root slug has depth 0.
pub fn depth(slug: &str) -> usize {
  slug.split('/').filter(|s| !s.is_empty()).count()
}

/// The slug one level up, or `None` for the root.
pub fn parent_of(slug: &str) -> Option<&str> {
  if slug == ROOT {
    return None;
  }
  match slug.rfind('/') {
    Some(0) => Some(ROOT),
    Some(i) => Some(&slug[..i]),
    None => None,
  }
}

/// The final segment of `slug` (empty for the root).
pub fn last_segment(slug: &str) -> &str {
  slug.rsplit('/').next().unwrap_or_default()
}

/// `parent` extended by one segment.
pub fn child_of(parent: &str, segment: &str) -> String {
  if parent == ROOT {
    format!("/{segment}")
  } else {
    format!("{parent}/{segment}")
  }
}

/// The prefix every strict descendant of `slug` starts with.
pub fn child_prefix(slug: &str) -> String {
  if slug == ROOT {
    ROOT.to_owned()
  } else {
    format!("{slug}/")
  }
}

/// Half-open range `[lower, upper)` containing exactly the strict
/// descendants of `slug` in byte order.
///
/// `'0'` is the successor of `'/'`, so every string starting with `slug/`
/// sorts below `slug0`.
pub fn subtree_range(slug: &str) -> (String, String) {
  let lower = child_prefix(slug);
  let mut upper = lower.clone();
  upper.pop();
  upper.push('0');
  (lower, upper)
}

/// Whether `slug` lies strictly below `root`.
pub fn is_within(slug: &str, root: &str) -> bool {
  slug != root && slug.starts_with(&child_prefix(root))
}

/// Whether two subtrees share any node.
pub fn overlaps(a: &str, b: &str) -> bool {
  a == b || is_within(a, b) || is_within(b, a)
}

/// Replace the `old_root` prefix of `slug` with `new_root`.
///
/// Returns `None` if `slug` is not `old_root` or one of its descendants.
pub fn rebase(slug: &str, old_root: &str, new_root: &str) -> Option<String> {
  if slug == old_root {
    return Some(new_root.to_owned());
  }
  if !is_within(slug, old_root) {
    return None;
  }
  let rest = &slug[child_prefix(old_root).len()..];
  Some(child_of(new_root, rest))
}
