//! Escape-sequence stripping for logged output lines.

use vte::{Params, Parser, Perform};

/// Render one raw output line as plain text for the log.
///
/// Terminal control sequences (colors, cursor movement, window titles) and
/// control characters other than tab are dropped. Invalid UTF-8 is replaced.
pub fn plain_line(input: &[u8]) -> String {
    let mut extractor = PlainTextExtractor::default();
    let mut parser = Parser::new();

    parser.advance(&mut extractor, input);

    String::from_utf8_lossy(&extractor.output).into_owned()
}

/// VTE performer that keeps printable text only.
#[derive(Default)]
struct PlainTextExtractor {
    output: Vec<u8>,
}

impl Perform for PlainTextExtractor {
    fn print(&mut self, c: char) {
        let mut buf = [0u8; 4];
        let encoded = c.encode_utf8(&mut buf);
        self.output.extend_from_slice(encoded.as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if byte == b'\t' {
            self.output.push(byte);
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}
