use std::fmt::Display;
use std::io::Write;
#[cfg(test)]
use std::sync::{Arc, Mutex};

#[derive(Clone)]
enum Sink {
    Stderr,
    #[cfg(test)]
    Discard,
    #[cfg(test)]
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/*
 * Progress reports the stages of a command to the user on stderr, one
 * line per stage. It's not a logger: diagnostics go through `log`.
 */
#[derive(Clone)]
pub struct Progress {
    sink: Sink,
}

impl Progress {

    pub fn stderr() -> Self {
	Self{ sink: Sink::Stderr }
    }

    #[cfg(test)]
    pub fn silent() -> Self {
	Self{ sink: Sink::Discard }
    }

    #[cfg(test)]
    pub fn buffered() -> (Self, Arc<Mutex<Vec<u8>>>) {
	let buffer = Arc::new(Mutex::new(Vec::new()));
	(Self{ sink: Sink::Buffer(buffer.clone()) }, buffer)
    }

    fn emit(&self, glyph: &str, msg: impl Display) {
	let line = format!("{} {}\n", glyph, msg);
	match &self.sink {
	    Sink::Stderr => {
		// nothing sensible to do if stderr is gone
		let _ = std::io::stderr().write_all(line.as_bytes());
	    },
	    #[cfg(test)]
	    Sink::Discard => {},
	    #[cfg(test)]
	    Sink::Buffer(buffer) => {
		if let Ok(mut buffer) = buffer.lock() {
		    buffer.extend_from_slice(line.as_bytes());
		}
	    },
	}
    }

    pub fn generate(&self, msg: impl Display) {
	self.emit("✚", msg);
    }

    pub fn action(&self, msg: impl Display) {
	self.emit("►", msg);
    }

    pub fn waiting(&self, msg: impl Display) {
	self.emit("◎", msg);
    }

    pub fn success(&self, msg: impl Display) {
	self.emit("✔", msg);
    }

    pub fn warning(&self, msg: impl Display) {
	self.emit("⚠", msg);
    }

    pub fn failure(&self, msg: impl Display) {
	self.emit("✗", msg);
    }
}

#[cfg(test)]
pub fn lines(buffer: &Arc<Mutex<Vec<u8>>>) -> Vec<String> {
    let bytes = buffer.lock().map(|b| b.clone()).unwrap_or_default();
    String::from_utf8_lossy(&bytes).lines().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_prefixed_in_order() {
	let (progress, buffer) = Progress::buffered();
	progress.action("checking");
	progress.waiting("waiting");
	progress.success("done");

	assert_eq!(lines(&buffer), vec!["► checking", "◎ waiting", "✔ done"]);
    }
}
