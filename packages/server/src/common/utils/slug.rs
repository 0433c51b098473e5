/// Lowercase, ASCII-alphanumeric slug with single dashes.
///
/// `"About Us!"` becomes `"about-us"`. Returns an empty string when nothing
/// usable remains.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("About Us!"), "about-us");
        assert_eq!(slugify("  --Hello,   World--  "), "hello-world");
        assert_eq!(slugify("Café 2024"), "caf-2024");
        assert_eq!(slugify("!!!"), "");
    }
}
