//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces `{key}` placeholders that appear in the template itself; braces
/// inside substituted values (user code, article text) are never expanded.
/// Unknown `{...}` spans are left as-is.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let hit = after.find('}').and_then(|close| {
      let key = &after[..close];
      pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (close, *v))
    });
    match hit {
      Some((close, v)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Log-safe truncation for large strings (char based, never splits a code point).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    None => s.to_string(),
    Some((cut, _)) => format!("{}… ({} bytes total)", &s[..cut], s.len()),
  }
}

/// Page title from the trailing path segment of a wiki URL.
/// Query strings and fragments are dropped; a bare title passes through.
pub fn title_from_url(url: &str) -> Option<String> {
  let no_frag = url.split('#').next().unwrap_or(url);
  let no_query = no_frag.split('?').next().unwrap_or(no_frag);
  let title = no_query.trim().trim_end_matches('/').rsplit('/').next()?.trim();
  if title.is_empty() { None } else { Some(title.to_string()) }
}
