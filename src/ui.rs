use std::io::{self, IsTerminal};

use crate::engine::{AppendOutcome, EngineOptions};
use crate::metrics::CounterSnapshot;
use crate::query::{ParagraphView, StoryBrief, StoryDetail, StoryPage};

pub fn print_append(outcome: &AppendOutcome) {
    let palette = Palette::auto();
    println!("{}", format_append(outcome, &palette));
}

pub fn print_story_page(page: &StoryPage) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Stories"));
    if page.results.is_empty() {
        println!("{}", palette.dim("no stories on this page"));
    }
    for story in &page.results {
        println!("{}", format_story_row(story, &palette));
    }
    println!(
        "{}",
        palette.dim(&format!(
            "{} of {} story(s), offset {}",
            page.results.len(),
            page.count,
            page.offset
        ))
    );
}

pub fn print_story_detail(detail: &StoryDetail) {
    let palette = Palette::auto();
    println!("{}", format_story_row(&detail.story, &palette));
    for paragraph in &detail.paragraphs {
        println!();
        println!("{}", format_paragraph(paragraph));
    }
    println!();
    println!(
        "{}",
        palette.dim(&format!(
            "{} paragraph(s), {} word(s)",
            detail.paragraphs.len(),
            detail.word_count()
        ))
    );
}

fn format_paragraph(paragraph: &ParagraphView) -> String {
    paragraph
        .sentences
        .iter()
        .filter(|sentence| !sentence.is_empty())
        .map(|sentence| format!("{sentence}."))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_status(open: Option<&StoryBrief>) {
    let palette = Palette::auto();
    match open {
        Some(story) => println!("{}", format_story_row(story, &palette)),
        None => println!("{}", palette.dim("no open story; the next word starts one")),
    }
}

pub fn print_policy(options: &EngineOptions) {
    let palette = Palette::auto();
    let policy = &options.policy;
    println!("{}", palette.heading("Capacity"));
    println!("title_words         {}", policy.title_words);
    println!("sentence_words      {}", policy.sentence_words);
    println!("paragraph_sentences {}", policy.paragraph_sentences);
    println!("story_paragraphs    {}", policy.story_paragraphs);
    println!("max_word_chars      {}", options.max_word_chars);
}

pub fn print_counters(counters: &CounterSnapshot) {
    let palette = Palette::auto();
    println!(
        "{}",
        palette.dim(&format!(
            "appended={} rejected={} failed={} sentences={} paragraphs={} stories={} elapsed_us={}",
            counters.appended,
            counters.rejected,
            counters.failed,
            counters.sentences_finished,
            counters.paragraphs_finished,
            counters.stories_finished,
            counters.elapsed_micros
        ))
    );
}

fn format_append(outcome: &AppendOutcome, palette: &Palette) -> String {
    let mut line = format!(
        "{} {}",
        palette.id(&format!("#{}", outcome.story_id)),
        display_title(&outcome.title)
    );
    if !outcome.current_sentence.is_empty() {
        line.push_str(": ");
        line.push_str(&outcome.current_sentence);
    }
    let finalized = outcome.finalized;
    let finished = [
        (finalized.sentence, "sentence"),
        (finalized.paragraph, "paragraph"),
        (finalized.story, "story"),
    ]
    .into_iter()
    .filter(|(done, _)| *done)
    .map(|(_, label)| label)
    .collect::<Vec<_>>();
    if !finished.is_empty() {
        line.push(' ');
        line.push_str(&palette.state(&format!("[finished {}]", finished.join("+"))));
    }
    line
}

fn format_story_row(story: &StoryBrief, palette: &Palette) -> String {
    let marker = if story.finished { "[DONE]" } else { "[OPEN]" };
    format!(
        "{} {} {} {}",
        palette.id(&format!("#{}", story.id)),
        palette.state(marker),
        display_title(&story.title),
        palette.dim(&story.updated_at)
    )
}

fn display_title(title: &str) -> &str {
    if title.is_empty() {
        "(untitled)"
    } else {
        title
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn state(&self, text: &str) -> String {
        self.paint("33", text)
    }
}
