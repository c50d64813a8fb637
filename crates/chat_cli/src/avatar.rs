use std::io::Write;

use chat_session::AssistantAvatar;

const FRAMES: [&str; 3] = ["(o_o)", "(O_o)", "(o_O)"];

/// Text stand-in for the animated companion.
pub struct TerminalAvatar<W: Write> {
    out: W,
    frame: usize,
}

impl<W: Write> TerminalAvatar<W> {
    pub fn new(out: W) -> Self {
        Self { out, frame: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // Companion output is decoration; a failed write is not worth surfacing.
        let _ = writeln!(self.out, "{} {text}", FRAMES[self.frame]);
        let _ = self.out.flush();
    }
}

impl<W: Write> AssistantAvatar for TerminalAvatar<W> {
    fn play(&mut self, cue: &str) {
        self.line(&format!("*{cue}...*"));
    }

    fn speak(&mut self, text: &str) {
        self.line(&format!("\"{text}\""));
    }

    fn stop(&mut self) {}

    fn animate(&mut self) {
        self.frame = (self.frame + 1) % FRAMES.len();
        self.line("*wiggles*");
    }
}
