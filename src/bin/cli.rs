use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use filebox::models::{AccountResponse, FileSummary, IndexResponse};
use filebox::storage::display_name;
use filebox::SESSION_COOKIE;
use percent_encoding::percent_decode_str;
use prettytable::{Cell, Row, Table};
use reqwest::header::{CONTENT_DISPOSITION, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SESSION_FILE: &str = ".filebox-session";

#[derive(Parser)]
#[command(name = "filebox")]
#[command(about = "Command-line client for the filebox server", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "FILEBOX_URL",
        default_value = "http://localhost:3000",
        help = "Server base URL"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create a new account and log in")]
    Signup {
        #[arg(short, long, help = "Email address")]
        email: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "Log in to your account")]
    Login {
        #[arg(short, long, help = "Email address")]
        email: String,

        #[arg(short, long, help = "Password")]
        password: String,
    },

    #[command(about = "Log out of your account")]
    Logout,

    #[command(about = "Show current user")]
    Whoami,

    #[command(about = "Upload a file")]
    Upload {
        #[arg(short, long, help = "Path to the file")]
        file: PathBuf,
    },

    #[command(about = "List your files")]
    List,

    #[command(about = "Rename a file (the extension is kept)")]
    Rename {
        #[arg(short, long, help = "File ID")]
        id: String,

        #[arg(short, long, help = "New name without extension")]
        name: String,
    },

    #[command(about = "Delete a file")]
    Delete {
        #[arg(short, long, help = "File ID")]
        id: String,
    },

    #[command(about = "Download a file")]
    Download {
        #[arg(short, long, help = "File ID")]
        id: String,

        #[arg(short, long, default_value = ".", help = "Directory to save into")]
        out: PathBuf,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Session {
    token: String,
    email: String,
}

impl Session {
    fn save(&self) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(SESSION_FILE, json)?;
        Ok(())
    }

    fn load() -> Option<Self> {
        if Path::new(SESSION_FILE).exists() {
            let data = fs::read_to_string(SESSION_FILE).ok()?;
            serde_json::from_str(&data).ok()
        } else {
            None
        }
    }

    fn clear() -> Result<()> {
        if Path::new(SESSION_FILE).exists() {
            fs::remove_file(SESSION_FILE)?;
        }
        Ok(())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(COOKIE, format!("{}={}", SESSION_COOKIE, self.token))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

struct Api {
    http: reqwest::Client,
    base: String,
}

impl Api {
    fn new(base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run_command(Api::new(cli.server), cli.command).await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_command(api: Api, command: Commands) -> Result<()> {
    match command {
        Commands::Signup { email, password } => {
            authenticate(&api, "/sign-up", email, password).await?;
        }
        Commands::Login { email, password } => {
            authenticate(&api, "/login", email, password).await?;
        }
        Commands::Logout => {
            logout(&api).await?;
        }
        Commands::Whoami => {
            whoami();
        }
        Commands::Upload { file } => {
            let session = require_login()?;
            upload_file(&api, &session, &file).await?;
        }
        Commands::List => {
            let session = require_login()?;
            list_files(&api, &session).await?;
        }
        Commands::Rename { id, name } => {
            let session = require_login()?;
            rename_file(&api, &session, &id, &name).await?;
        }
        Commands::Delete { id } => {
            let session = require_login()?;
            delete_file(&api, &session, &id).await?;
        }
        Commands::Download { id, out } => {
            let session = require_login()?;
            download_file(&api, &session, &id, &out).await?;
        }
    }

    Ok(())
}

async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .context("Failed to reach the file server. Is it running?")?;

    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => bail!("{} ({})", body.error, status),
        Err(_) => bail!("request failed with {}: {}", status, text),
    }
}

async fn authenticate(api: &Api, path: &str, email: String, password: String) -> Result<()> {
    let response = send(
        api.http
            .post(api.url(path))
            .form(&[("email", email.as_str()), ("password", password.as_str())]),
    )
    .await?;

    let token = response
        .cookies()
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .context("Server did not return a session")?;
    let account: AccountResponse = response.json().await.context("Failed to parse response")?;

    Session {
        token,
        email: account.email.clone(),
    }
    .save()?;

    println!("✅ Logged in as {}", account.email);
    println!("🆔 User ID: {}", account.id);
    Ok(())
}

async fn logout(api: &Api) -> Result<()> {
    if let Some(session) = Session::load() {
        send(session.authorize(api.http.post(api.url("/logout")))).await?;
    }
    Session::clear()?;
    println!("✅ Logged out successfully!");
    Ok(())
}

fn whoami() {
    if let Some(session) = Session::load() {
        println!("👤 Logged in as: {}", session.email);
    } else {
        println!("❌ Not logged in");
        println!("💡 Use 'filebox login -e <email> -p <password>' to log in");
    }
}

fn require_login() -> Result<Session> {
    Session::load().ok_or_else(|| {
        anyhow::anyhow!("You must be logged in. Use: filebox login -e <email> -p <password>")
    })
}

async fn upload_file(api: &Api, session: &Session, path: &Path) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("File path has no usable file name")?
        .to_string();
    let mimetype = mime_guess::from_path(path).first_or_octet_stream().to_string();

    let part = Part::bytes(data)
        .file_name(filename)
        .mime_str(&mimetype)?;
    let form = Form::new().part("file", part);

    let response = send(session.authorize(api.http.post(api.url("/upload")).multipart(form))).await?;
    let file: FileSummary = response.json().await.context("Failed to parse response")?;

    println!("✅ File uploaded successfully!");
    println!("📄 Filename: {}", file.filename);
    println!("🆔 File ID: {}", file.id);
    println!("📊 Size: {} bytes ({})", file.size_bytes, file.mimetype);
    Ok(())
}

async fn list_files(api: &Api, session: &Session) -> Result<()> {
    let response = send(session.authorize(api.http.get(api.url("/")))).await?;
    let index: IndexResponse = response.json().await.context("Failed to parse response")?;

    if index.user.is_none() {
        bail!("Your session has expired. Please log in again.");
    }

    if index.files.is_empty() {
        println!("📭 No files uploaded yet.");
        println!("💡 Use 'filebox upload -f <path>' to upload a file");
        return Ok(());
    }

    println!("\n📚 Your files ({})\n", index.files.len());

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("ID"),
        Cell::new("Filename"),
        Cell::new("Type"),
        Cell::new("Size"),
        Cell::new("Uploaded"),
    ]));

    for file in index.files {
        let uploaded = file.uploaded_at.with_timezone(&Local);
        table.add_row(Row::new(vec![
            Cell::new(&file.id),
            Cell::new(&file.filename),
            Cell::new(&file.mimetype),
            Cell::new(&file.size_bytes.to_string()),
            Cell::new(&uploaded.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]));
    }

    table.printstd();
    println!();
    Ok(())
}

async fn rename_file(api: &Api, session: &Session, id: &str, name: &str) -> Result<()> {
    let response = send(
        session.authorize(
            api.http
                .post(api.url(&format!("/rename/{}", id)))
                .form(&[("newName", name)]),
        ),
    )
    .await?;
    let file: FileSummary = response.json().await.context("Failed to parse response")?;

    println!("✅ Renamed to '{}'", file.filename);
    Ok(())
}

async fn delete_file(api: &Api, session: &Session, id: &str) -> Result<()> {
    send(session.authorize(api.http.post(api.url(&format!("/delete/{}", id))))).await?;
    println!("🗑️  File {} deleted", id);
    Ok(())
}

async fn download_file(api: &Api, session: &Session, id: &str, out: &Path) -> Result<()> {
    let response = send(session.authorize(api.http.get(api.url(&format!("/download/{}", id))))).await?;

    let filename = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(disposition_filename)
        .and_then(|name| display_name(&name))
        .unwrap_or_else(|| id.to_string());
    let bytes = response.bytes().await.context("Failed to read download")?;

    let target = out.join(&filename);
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    println!("✅ Saved {} ({} bytes)", target.display(), bytes.len());
    Ok(())
}

/// Extracts the UTF-8 `filename*` parameter of a Content-Disposition value.
fn disposition_filename(value: &str) -> Option<String> {
    let encoded = value
        .split(';')
        .map(str::trim)
        .find_map(|p| p.strip_prefix("filename*=UTF-8''"))?;

    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}
