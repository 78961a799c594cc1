use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

const WHATSAPP_BASE: &str = "https://wa.me/";

// Characters a browser's `encodeURIComponent` leaves as they are
const TEXT_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Build the WhatsApp link for a decoded payload.
///
/// An empty destination produces a share link that lets the user pick a
/// recipient. Otherwise the destination is used verbatim as the path segment.
/// The payload is percent-encoded as the `text` query value and is otherwise
/// passed through untouched.
pub fn whatsapp_link(text: &str, destination: &str) -> String {
    format!(
        "{}{}?text={}",
        WHATSAPP_BASE,
        destination,
        utf8_percent_encode(text, TEXT_VALUE)
    )
}
