use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::{self, Write};

pub trait Clipboard {
    fn copy(&mut self, text: &str) -> io::Result<()>;
}

/// Writes to the system clipboard through the terminal emulator using the
/// OSC 52 escape, which also works over SSH.
pub struct TerminalClipboard;

impl Clipboard for TerminalClipboard {
    fn copy(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(osc52_sequence(text).as_bytes())?;
        stdout.flush()
    }
}

pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text))
}

#[cfg(test)]
pub mod testing {
    use super::Clipboard;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    /// Records copies; optionally fails every write.
    #[derive(Clone, Default)]
    pub struct RecordingClipboard {
        pub copied: Rc<RefCell<Vec<String>>>,
        pub fail: bool,
    }

    impl Clipboard for RecordingClipboard {
        fn copy(&mut self, text: &str) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal gone"));
            }
            self.copied.borrow_mut().push(text.to_string());
            Ok(())
        }
    }
}
