use std::{
    collections::HashMap,
    io::{self, BufRead, BufReader, Stdin, Stdout, Write},
    sync::Mutex,
};

use toastchat_core::{ActionId, Notifier, NotifyError, Prompt, PromptResponse};

/// Terminal stand-in for toasts: prints the prompt and reads the answer
/// line by line. A blank line or end of input dismisses the prompt.
pub struct ConsoleNotifier<R, W> {
    title: String,
    io: Mutex<(R, W)>,
}

impl ConsoleNotifier<BufReader<Stdin>, Stdout> {
    pub fn stdio(title: &str) -> Self {
        Self::new(title, BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> ConsoleNotifier<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    pub fn new(title: &str, reader: R, writer: W) -> Self {
        Self {
            title: title.to_owned(),
            io: Mutex::new((reader, writer)),
        }
    }

    pub fn into_inner(self) -> Option<(R, W)> {
        self.io.into_inner().ok()
    }
}

fn read_line(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
}

fn pick<'a>(items: &'a [String], answer: &str) -> Option<&'a String> {
    let index: usize = answer.trim().parse().ok()?;
    items.get(index.checked_sub(1)?)
}

fn ask(
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    prompt: &Prompt,
) -> io::Result<PromptResponse> {
    if prompt.actions.is_empty() {
        writer.flush()?;
        return Ok(PromptResponse::Dismissed);
    }

    if !prompt.selection.is_empty() {
        writeln!(writer, "  cached chats:")?;
        for (index, name) in prompt.selection.iter().enumerate() {
            writeln!(writer, "    {}) {name}", index + 1)?;
        }
    }
    for (index, action) in prompt.actions.iter().enumerate() {
        writeln!(writer, "  [{}] {}", index + 1, action.label)?;
    }
    write!(writer, "choose (blank to dismiss): ")?;
    writer.flush()?;

    let Some(answer) = read_line(reader)? else {
        return Ok(PromptResponse::Dismissed);
    };
    let chosen = answer
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| prompt.actions.get(index));
    let Some(action) = chosen else {
        if !answer.trim().is_empty() {
            writeln!(writer, "no such choice: {}", answer.trim())?;
        }
        return Ok(PromptResponse::Dismissed);
    };

    if let Some(path) = &action.open {
        writeln!(writer, "open: {}", path.display())?;
        return Ok(PromptResponse::action(ActionId::OpenFile));
    }

    let mut inputs = HashMap::new();
    for input in &prompt.inputs {
        write!(writer, "{} ", input.placeholder())?;
        writer.flush()?;
        let value = read_line(reader)?.unwrap_or_default();
        inputs.insert(*input, value);
    }

    let mut selection = None;
    if !prompt.selection.is_empty() {
        write!(writer, "cached chat number (blank for none): ")?;
        writer.flush()?;
        if let Some(answer) = read_line(reader)? {
            selection = pick(&prompt.selection, &answer).cloned();
        }
    }

    Ok(PromptResponse::Activated {
        action: action.id,
        inputs,
        selection,
    })
}

impl<R, W> Notifier for ConsoleNotifier<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn prompt(&self, prompt: &Prompt) -> Result<PromptResponse, NotifyError> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| NotifyError("console lock poisoned".to_owned()))?;
        let (reader, writer) = &mut *guard;

        let shown = writeln!(writer, "\n[{}] {}", self.title, prompt.body).and_then(|()| {
            match &prompt.image {
                Some(image) => writeln!(writer, "  image: {}", image.display()),
                None => Ok(()),
            }
        });
        shown
            .and_then(|()| ask(reader, writer, prompt))
            .map_err(|err| NotifyError(format!("console i/o failed: {err}")))
    }
}
