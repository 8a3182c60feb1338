use crate::backend::LocalBackend;
use crate::editor::{EditorStore, TextBuffer};
use crate::languages::{language_config, supported_languages};
use crate::providers::ExecutionProvider;
use crate::schema::{NewExecution, SnippetId};
use crate::storage::KeyValueStore;
use crate::types::UserConfig;
use std::io::{self, Write};
use std::path::PathBuf;

/// Snippet backend plus the identity the session acts as.
pub struct SharingContext {
    backend: LocalBackend,
    path: PathBuf,
    user: UserConfig,
}

impl SharingContext {
    /// Opens the backend file and registers the configured user in it.
    pub fn open(path: PathBuf, user: UserConfig) -> anyhow::Result<Self> {
        let mut backend = LocalBackend::load(&path)?;
        if user.is_signed_in() {
            backend.sync_user(&user.id, &user.email, &user.name);
            backend.save(&path)?;
        }
        Ok(Self {
            backend,
            path,
            user,
        })
    }

    pub fn backend(&self) -> &LocalBackend {
        &self.backend
    }

    fn signed_in_user(&self) -> anyhow::Result<&str> {
        if self.user.is_signed_in() {
            Ok(&self.user.id)
        } else {
            anyhow::bail!("no user configured; set [user] id in .snipper.toml or SNIPPER_USER_ID")
        }
    }

    fn persist(&self) -> anyhow::Result<()> {
        self.backend.save(&self.path)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReplCommand {
    Help,
    Exit,
    Run,
    Show,
    Clear,
    Reset,
    Prefs,
    Languages,
    Language(String),
    Theme(String),
    FontSize(u32),
    Share(String),
    Snippets,
    View(SnippetId),
    Star(SnippetId),
    Comment(SnippetId, String),
    Delete(SnippetId),
    Stats,
    Code(String),
    Usage(&'static str),
    Unknown(String),
}

/// Parses one input line. Lines that are not slash commands are code.
///
/// # Examples
///
/// ```
/// use snipper_core::repl::{parse_command, ReplCommand};
///
/// assert_eq!(parse_command("/lang rust"), ReplCommand::Language("rust".to_string()));
/// assert_eq!(parse_command("let x = 1;"), ReplCommand::Code("let x = 1;".to_string()));
/// ```
pub fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if !trimmed.starts_with('/') {
        return ReplCommand::Code(line.to_string());
    }

    let (name, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(n, r)| (n, r.trim()))
        .unwrap_or((trimmed, ""));

    let snippet_id = |usage: &'static str| match rest.parse::<u64>() {
        Ok(id) => Ok(SnippetId(id)),
        Err(_) => Err(ReplCommand::Usage(usage)),
    };

    match name {
        "/help" => ReplCommand::Help,
        "/exit" | "/quit" => ReplCommand::Exit,
        "/run" => ReplCommand::Run,
        "/show" => ReplCommand::Show,
        "/clear" => ReplCommand::Clear,
        "/reset" => ReplCommand::Reset,
        "/prefs" => ReplCommand::Prefs,
        "/languages" => ReplCommand::Languages,
        "/snippets" => ReplCommand::Snippets,
        "/stats" => ReplCommand::Stats,
        "/lang" if !rest.is_empty() => ReplCommand::Language(rest.to_string()),
        "/lang" => ReplCommand::Usage("usage: /lang <language>"),
        "/theme" if !rest.is_empty() => ReplCommand::Theme(rest.to_string()),
        "/theme" => ReplCommand::Usage("usage: /theme <theme>"),
        "/font" => match rest.parse::<u32>() {
            Ok(size) => ReplCommand::FontSize(size),
            Err(_) => ReplCommand::Usage("usage: /font <size>"),
        },
        "/share" if !rest.is_empty() => ReplCommand::Share(rest.to_string()),
        "/share" => ReplCommand::Usage("usage: /share <title>"),
        "/view" => snippet_id("usage: /view <snippet id>").map_or_else(|u| u, ReplCommand::View),
        "/star" => snippet_id("usage: /star <snippet id>").map_or_else(|u| u, ReplCommand::Star),
        "/delete" => {
            snippet_id("usage: /delete <snippet id>").map_or_else(|u| u, ReplCommand::Delete)
        }
        "/comment" => {
            let usage = ReplCommand::Usage("usage: /comment <snippet id> <text>");
            let Some((id, text)) = rest.split_once(char::is_whitespace) else {
                return usage;
            };
            match (id.parse::<u64>(), text.trim()) {
                (Ok(id), text) if !text.is_empty() => {
                    ReplCommand::Comment(SnippetId(id), text.to_string())
                }
                _ => usage,
            }
        }
        other => ReplCommand::Unknown(other.to_string()),
    }
}

/// Interactive editing session: typed lines go into the buffer, slash
/// commands drive the store.
pub async fn run_repl<P, S>(
    store: &mut EditorStore<P, S>,
    mut sharing: Option<SharingContext>,
) -> anyhow::Result<()>
where
    P: ExecutionProvider,
    S: KeyValueStore,
{
    store.attach_editor(TextBuffer::default());

    println!("snipper editor ({})", store.language());
    println!("Type code line by line, /run to execute, /help for commands.");
    if !store.code().is_empty() {
        println!("restored saved {} draft", store.language());
    }

    loop {
        print!("{}> ", store.language());
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }

        let command = parse_command(line);
        if command == ReplCommand::Exit {
            break;
        }
        if let Err(e) = handle_command(store, sharing.as_mut(), command).await {
            println!("error: {e}");
        }
    }

    store.save_draft()?;
    Ok(())
}

async fn handle_command<P, S>(
    store: &mut EditorStore<P, S>,
    sharing: Option<&mut SharingContext>,
    command: ReplCommand,
) -> anyhow::Result<()>
where
    P: ExecutionProvider,
    S: KeyValueStore,
{
    match command {
        ReplCommand::Help => print_help(),
        ReplCommand::Exit => {}
        ReplCommand::Code(line) => {
            if let Some(editor) = store.editor_mut() {
                let mut code = editor.value();
                code.push_str(&line);
                code.push('\n');
                editor.set_value(&code);
            }
        }
        ReplCommand::Run => {
            let before = store.generation();
            store.run().await;
            match store.error() {
                Some(error) => println!("error: {error}"),
                None => println!("{}", store.output()),
            }
            let fresh = store
                .execution_result()
                .filter(|_| store.generation() != before);
            if let (Some(ctx), Some(result)) = (sharing, fresh) {
                if ctx.user.is_signed_in() {
                    let row = NewExecution::from_result(store.language(), result);
                    ctx.backend.save_execution(&ctx.user.id, row)?;
                    ctx.persist()?;
                }
            }
        }
        ReplCommand::Show => {
            let code = store.code();
            if code.is_empty() {
                println!("buffer is empty");
            } else {
                print!("{code}");
            }
        }
        ReplCommand::Clear => {
            if let Some(editor) = store.editor_mut() {
                editor.set_value("");
            }
            println!("buffer cleared");
        }
        ReplCommand::Reset => {
            store.reset_to_default()?;
            println!("{} buffer reset to starter program", store.language());
        }
        ReplCommand::Prefs => {
            println!("language:  {}", store.language());
            println!("theme:     {}", store.theme());
            println!("font size: {}", store.font_size());
        }
        ReplCommand::Languages => {
            for lang in supported_languages() {
                println!(
                    "  {:<12} {:<12} {} {}",
                    lang.id, lang.label, lang.runtime.language, lang.runtime.version
                );
            }
        }
        ReplCommand::Language(language) => {
            if language_config(&language).is_none() {
                println!("warning: `{language}` has no runtime; /run will fail");
            }
            store.set_language(&language)?;
            store.attach_editor(TextBuffer::default());
            println!("switched to {language}");
        }
        ReplCommand::Theme(theme) => {
            store.set_theme(&theme)?;
            println!("theme set to {theme}");
        }
        ReplCommand::FontSize(size) => {
            store.set_font_size(size)?;
            println!("font size set to {size}");
        }
        ReplCommand::Share(title) => {
            let ctx = require_sharing(sharing)?;
            let code = store.code();
            if code.trim().is_empty() {
                anyhow::bail!("nothing to share; the buffer is empty");
            }
            let user_id = ctx.signed_in_user()?.to_string();
            let id = ctx
                .backend
                .create_snippet(&user_id, &title, store.language(), &code)?;
            ctx.persist()?;
            println!("shared snippet {id}: {title}");
        }
        ReplCommand::Snippets => {
            let ctx = require_sharing(sharing)?;
            let snippets = ctx.backend.snippets();
            if snippets.is_empty() {
                println!("no snippets yet");
            }
            for s in snippets {
                let starred = if ctx.backend.is_starred(&ctx.user.id, s.id) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{starred} {:>4}  {:<24} {:<11} by {} ({} stars)",
                    s.id.to_string(),
                    s.title,
                    s.language,
                    s.user_name,
                    ctx.backend.star_count(s.id)
                );
            }
        }
        ReplCommand::View(id) => {
            let ctx = require_sharing(sharing)?;
            let Some(snippet) = ctx.backend.snippet(id) else {
                anyhow::bail!("snippet {id} not found");
            };
            println!("# {} ({}) by {}", snippet.title, snippet.language, snippet.user_name);
            println!("{}", snippet.code);
            for comment in ctx.backend.comments(id) {
                println!("  [{}] {}: {}", comment.id, comment.username, comment.content);
            }
        }
        ReplCommand::Star(id) => {
            let ctx = require_sharing(sharing)?;
            let user_id = ctx.signed_in_user()?.to_string();
            let starred = ctx.backend.toggle_star(&user_id, id)?;
            ctx.persist()?;
            println!(
                "snippet {id} {}",
                if starred { "starred" } else { "unstarred" }
            );
        }
        ReplCommand::Comment(id, text) => {
            let ctx = require_sharing(sharing)?;
            let user_id = ctx.signed_in_user()?.to_string();
            let comment = ctx.backend.add_comment(&user_id, id, &text)?;
            ctx.persist()?;
            println!("comment {comment} added to snippet {id}");
        }
        ReplCommand::Delete(id) => {
            let ctx = require_sharing(sharing)?;
            let user_id = ctx.signed_in_user()?.to_string();
            ctx.backend.delete_snippet(&user_id, id)?;
            ctx.persist()?;
            println!("snippet {id} deleted");
        }
        ReplCommand::Stats => {
            let ctx = require_sharing(sharing)?;
            let user_id = ctx.signed_in_user()?.to_string();
            let stats = ctx.backend.user_stats(&user_id);
            println!("executions:      {}", stats.total_executions);
            println!("last 24 hours:   {}", stats.last_24_hours);
            println!("languages:       {}", stats.languages.join(", "));
            println!(
                "favorite:        {}",
                stats.favorite_language.as_deref().unwrap_or("-")
            );
            println!("starred:         {}", stats.starred_count);
        }
        ReplCommand::Usage(usage) => println!("{usage}"),
        ReplCommand::Unknown(name) => println!("unknown command: {name}. try /help"),
    }
    Ok(())
}

fn require_sharing(sharing: Option<&mut SharingContext>) -> anyhow::Result<&mut SharingContext> {
    sharing.ok_or_else(|| anyhow::anyhow!("snippet sharing is not available in this session"))
}

fn print_help() {
    println!("snipper editor commands");
    println!("  <code>                        append a line to the buffer");
    println!("  /run                          execute the buffer");
    println!("  /show                         print the buffer");
    println!("  /clear                        empty the buffer");
    println!("  /reset                        replace the buffer with the starter program");
    println!("  /lang <language>              save the draft and switch language");
    println!("  /languages                    list supported languages");
    println!("  /theme <theme>                set editor theme");
    println!("  /font <size>                  set editor font size");
    println!("  /prefs                        show current preferences");
    println!("  /share <title>                share the buffer as a snippet");
    println!("  /snippets                     list shared snippets");
    println!("  /view <id>                    show a snippet and its comments");
    println!("  /star <id>                    star or unstar a snippet");
    println!("  /comment <id> <text>          comment on a snippet");
    println!("  /delete <id>                  delete one of your snippets");
    println!("  /stats                        show your execution statistics");
    println!("  /exit | /quit                 leave the editor");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;
    use crate::storage::MemoryStore;

    #[test]
    fn plain_lines_are_code() {
        assert_eq!(
            parse_command("  print('x')"),
            ReplCommand::Code("  print('x')".to_string())
        );
    }

    #[test]
    fn parses_settings_commands() {
        assert_eq!(parse_command("/font 16"), ReplCommand::FontSize(16));
        assert_eq!(
            parse_command("/theme vs-light"),
            ReplCommand::Theme("vs-light".to_string())
        );
        assert!(matches!(parse_command("/font big"), ReplCommand::Usage(_)));
        assert!(matches!(parse_command("/lang"), ReplCommand::Usage(_)));
    }

    #[test]
    fn parses_snippet_commands() {
        assert_eq!(parse_command("/star 3"), ReplCommand::Star(SnippetId(3)));
        assert_eq!(
            parse_command("/comment 3 looks good"),
            ReplCommand::Comment(SnippetId(3), "looks good".to_string())
        );
        assert!(matches!(parse_command("/comment 3"), ReplCommand::Usage(_)));
        assert!(matches!(parse_command("/delete abc"), ReplCommand::Usage(_)));
        assert_eq!(
            parse_command("/share my first snippet"),
            ReplCommand::Share("my first snippet".to_string())
        );
    }

    #[test]
    fn unknown_slash_command_is_reported() {
        assert_eq!(
            parse_command("/frobnicate now"),
            ReplCommand::Unknown("/frobnicate".to_string())
        );
    }

    #[tokio::test]
    async fn code_lines_accumulate_and_run() {
        let mut store = EditorStore::new(MockProvider::echo(), MemoryStore::new());
        store.attach_editor(TextBuffer::default());
        handle_command(&mut store, None, parse_command("const a = 1;"))
            .await
            .unwrap();
        handle_command(&mut store, None, parse_command("console.log(a);"))
            .await
            .unwrap();
        assert_eq!(store.code(), "const a = 1;\nconsole.log(a);\n");

        handle_command(&mut store, None, ReplCommand::Run).await.unwrap();
        assert_eq!(store.output(), "const a = 1;\nconsole.log(a);");
    }

    #[tokio::test]
    async fn sharing_commands_require_backend() {
        let mut store = EditorStore::new(MockProvider::echo(), MemoryStore::new());
        store.attach_editor(TextBuffer::new("x"));
        let err = handle_command(&mut store, None, ReplCommand::Snippets)
            .await
            .expect_err("no backend");
        assert!(err.to_string().contains("not available"));
    }

    #[tokio::test]
    async fn run_is_logged_for_signed_in_user() {
        let dir = std::env::temp_dir().join(format!(
            "snipper-repl-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time")
                .as_nanos()
        ));
        let user = UserConfig {
            id: "ada".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        };
        let mut ctx = SharingContext::open(dir.join("backend.json"), user).expect("open");

        let mut store = EditorStore::new(MockProvider::echo(), MemoryStore::new());
        store.attach_editor(TextBuffer::new("print(1)"));
        handle_command(&mut store, Some(&mut ctx), ReplCommand::Run)
            .await
            .unwrap();
        handle_command(&mut store, Some(&mut ctx), ReplCommand::Share("one".into()))
            .await
            .unwrap();

        assert_eq!(ctx.backend().executions_for_user("ada").len(), 1);
        assert_eq!(ctx.backend().snippets_for_user("ada").len(), 1);

        let reopened = LocalBackend::load(&dir.join("backend.json")).expect("reload");
        assert_eq!(reopened.snippets().len(), 1);
        assert_eq!(store.code(), "print(1)");

        std::fs::remove_dir_all(&dir).expect("cleanup temp dir");
    }
}
