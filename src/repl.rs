use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, PartialEq, Eq)]
pub enum HandleUserInputError {
    Terminate,
}

#[async_trait]
pub trait HandleUserInput {
    async fn handle(&mut self, user_input: String) -> Result<(), HandleUserInputError>;
}

/// Why a REPL stopped serving.
#[derive(Debug, PartialEq, Eq)]
pub enum Exit {
    /// The handler asked to stop.
    Quit,
    /// Input ran out or could not be read.
    EndOfInput,
}

pub struct Repl<H: HandleUserInput + Send> {
    handler: H,
    prompt: Option<String>,
}

impl<H: HandleUserInput + Send> Repl<H> {
    pub fn new(handler: H, prompt: Option<String>) -> Self {
        Self { handler, prompt }
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    pub async fn serve_stdin(&mut self) -> Exit {
        self.serve(tokio::io::BufReader::new(tokio::io::stdin()))
            .await
    }

    pub async fn serve<R>(&mut self, input: R) -> Exit
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut lines = input.lines();
        loop {
            if let Some(p) = &self.prompt {
                print!("{}", p);
                if let Err(e) = std::io::Write::flush(&mut std::io::stdout()) {
                    log::warn!("Failed to write REPL prompt: {}", e);
                }
            }

            match lines.next_line().await {
                Ok(Some(line)) => {
                    if self.handler.handle(line).await.is_err() {
                        return Exit::Quit;
                    }
                }
                Ok(None) => return Exit::EndOfInput,
                Err(e) => {
                    log::warn!("Failed to read user input: {}", e);
                    return Exit::EndOfInput;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Echo {
        seen: Vec<String>,
    }

    #[async_trait]
    impl HandleUserInput for Echo {
        async fn handle(&mut self, user_input: String) -> Result<(), HandleUserInputError> {
            if user_input == "bye" {
                return Err(HandleUserInputError::Terminate);
            }
            self.seen.push(user_input);
            Ok(())
        }
    }

    #[tokio::test]
    async fn serve_until_handler_quits() {
        let mut repl = Repl::new(Echo::default(), None);

        let exit = repl.serve(&b"one\ntwo\nbye\nthree\n"[..]).await;

        assert_eq!(exit, Exit::Quit);
        assert_eq!(repl.into_handler().seen, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn serve_until_input_ends() {
        let mut repl = Repl::new(Echo::default(), None);

        assert_eq!(repl.serve(&b"one\n"[..]).await, Exit::EndOfInput);
    }
}
