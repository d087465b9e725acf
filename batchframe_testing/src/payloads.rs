//! Hand-assembled batch payloads.
//!
//! The builder writes the wire format directly rather than going through
//! `BatchWriter`, so reader tests do not depend on writer behaviour.

/// Builds a raw multipart batch payload.
#[derive(Debug)]
pub struct BatchBuilder {
    boundary: String,
    changeset: Option<String>,
    out: String,
}

impl BatchBuilder {
    /// Start a payload framed by `boundary`.
    #[must_use]
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            changeset: None,
            out: String::new(),
        }
    }

    /// Text placed before the first delimiter.
    #[must_use]
    pub fn preamble(mut self, text: &str) -> Self {
        self.out.push_str(text);
        self
    }

    /// Append an `application/http` part.
    ///
    /// `line` is the request or status line; `headers` belong to the
    /// embedded message.
    #[must_use]
    pub fn operation(
        mut self,
        content_id: Option<&str>,
        line: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Self {
        self.delimiter();
        self.out
            .push_str("Content-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n");
        if let Some(id) = content_id {
            self.out.push_str(&format!("Content-ID: {id}\r\n"));
        }
        self.out.push_str("\r\n");
        self.out.push_str(line);
        self.out.push_str("\r\n");
        for (name, value) in headers {
            self.out.push_str(&format!("{name}: {value}\r\n"));
        }
        self.out.push_str("\r\n");
        self.out.push_str(body);
        self
    }

    /// Open a change set framed by `boundary`.
    ///
    /// # Panics
    ///
    /// Panics if a change set is already open.
    #[must_use]
    pub fn start_changeset(mut self, boundary: &str) -> Self {
        assert!(self.changeset.is_none(), "change set already open");
        self.delimiter();
        self.out.push_str(&format!(
            "Content-Type: multipart/mixed; boundary={boundary}\r\n\r\n"
        ));
        self.changeset = Some(boundary.to_owned());
        self
    }

    /// Close the open change set.
    ///
    /// # Panics
    ///
    /// Panics if no change set is open.
    #[must_use]
    pub fn end_changeset(mut self) -> Self {
        let boundary = self.changeset.take().expect("no change set open");
        self.out.push_str(&format!("\r\n--{boundary}--"));
        self
    }

    /// Append bytes verbatim.
    #[must_use]
    pub fn raw(mut self, text: &str) -> Self {
        self.out.push_str(text);
        self
    }

    /// Payload so far, without a closing delimiter.
    #[must_use]
    pub fn unterminated(self) -> Vec<u8> { self.out.into_bytes() }

    /// Close the batch and return the payload.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        if !self.out.is_empty() {
            self.out.push_str("\r\n");
        }
        self.out.push_str(&format!("--{}--\r\n", self.boundary));
        self.out.into_bytes()
    }

    fn delimiter(&mut self) {
        if !self.out.is_empty() {
            self.out.push_str("\r\n");
        }
        let active = self.changeset.as_deref().unwrap_or(&self.boundary);
        self.out.push_str(&format!("--{active}\r\n"));
    }
}
