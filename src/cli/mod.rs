//! CLI 모듈
//!
//! palank-chatbot CLI 명령어 정의 및 구현

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use crate::chatbot::{AnswerStream, ChatBot, IndexSource};
use crate::config::{get_api_key, Settings};
use crate::embedding::OpenAiEmbedding;
use crate::llm::OpenAiChat;
use crate::sync::VectorStoreSync;

/// 스트리밍 출력 시 줄바꿈 간격 (조각 수)
const FRAGMENTS_PER_LINE: usize = 80;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "palank-chatbot")]
#[command(version, about = "제품 지식 풀 기반 RAG 챗봇", long_about = None)]
pub struct Cli {
    /// 원격 버킷 이름
    #[arg(long, global = true, env = "PALANK_BUCKET")]
    pub bucket: Option<String>,

    /// 디버그 로그 출력
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 제품 인덱스를 만들고 원격 버킷에 업로드
    Build {
        /// 제품 ID
        id: String,
    },

    /// 원격 인덱스를 로컬로 내려받기
    Fetch {
        /// 제품 ID
        id: String,
    },

    /// 원격 인덱스 존재 여부
    Exists {
        /// 제품 ID
        id: String,
    },

    /// 원격 인덱스 삭제
    Delete {
        /// 제품 ID
        id: String,
    },

    /// 로컬 인덱스 삭제
    DeleteLocal {
        /// 제품 ID
        id: String,
    },

    /// 질문 하나에 답변
    Ask {
        /// 제품 ID
        id: String,

        /// 질문
        question: String,

        /// 로컬 인덱스만 사용 (디버그)
        #[arg(long)]
        local: bool,
    },

    /// 대화형 세션 (빈 줄 또는 Ctrl-D로 종료)
    Chat {
        /// 제품 ID
        id: String,

        /// 로컬 인덱스만 사용 (디버그)
        #[arg(long)]
        local: bool,

        /// 종료 시 원격과 로컬 인덱스 모두 삭제
        #[arg(long)]
        teardown: bool,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    get_api_key()?;
    settings.ensure_directories()?;

    let embedder = Arc::new(
        OpenAiEmbedding::from_settings(&settings).context("Failed to create embedding client")?,
    );
    let sync = Arc::new(VectorStoreSync::new(settings, embedder));

    if let Some(ref bucket) = cli.bucket {
        sync.init_remote_storage(bucket)?;
    }

    match cli.command {
        Commands::Build { id } => cmd_build(&sync, &id).await,
        Commands::Fetch { id } => cmd_fetch(&sync, &id).await,
        Commands::Exists { id } => cmd_exists(&sync, &id).await,
        Commands::Delete { id } => cmd_delete(&sync, &id).await,
        Commands::DeleteLocal { id } => cmd_delete_local(&sync, &id).await,
        Commands::Ask { id, question, local } => {
            let bot = connect(sync, &id, local).await?;
            ask_and_close(bot, &question, &mut std::io::stdout()).await
        }
        Commands::Chat { id, local, teardown } => {
            let bot = connect(sync, &id, local).await?;
            let result = chat_loop(&bot).await;
            if teardown {
                if !bot.teardown().await? {
                    println!("[!] 인덱스 삭제가 완전히 끝나지 않았습니다: {}", id);
                }
            } else {
                bot.close().await?;
            }
            result
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_build(sync: &VectorStoreSync, id: &str) -> Result<()> {
    println!("[*] 인덱스 생성 중: {}", id);

    if sync.build(id).await? {
        println!("[OK] 인덱스 업로드 완료: {}", sync.settings().remote_index_prefix(id));
        Ok(())
    } else {
        bail!("인덱스 업로드 실패: {} (원격과 로컬 사본을 정리했습니다)", id)
    }
}

async fn cmd_fetch(sync: &VectorStoreSync, id: &str) -> Result<()> {
    match sync.get(id).await? {
        Some(index) => {
            let chunks = index.count().await?;
            println!("[OK] {} 청크를 {:?}에 내려받았습니다", chunks, index.path());
            Ok(())
        }
        None => bail!("원격 인덱스를 가져오지 못했습니다: {}", id),
    }
}

async fn cmd_exists(sync: &VectorStoreSync, id: &str) -> Result<()> {
    if sync.exists(id).await? {
        println!("[OK] 원격 인덱스 있음: {}", id);
    } else {
        println!("[!] 원격 인덱스 없음: {}", id);
    }
    Ok(())
}

async fn cmd_delete(sync: &VectorStoreSync, id: &str) -> Result<()> {
    if sync.delete(id).await? {
        println!("[OK] 원격 인덱스 삭제됨: {}", id);
        Ok(())
    } else {
        bail!("원격 인덱스 삭제 실패: {}", id)
    }
}

async fn cmd_delete_local(sync: &VectorStoreSync, id: &str) -> Result<()> {
    if sync.delete_local(id).await? {
        println!("[OK] 로컬 인덱스 삭제됨: {}", id);
        Ok(())
    } else {
        bail!("로컬 인덱스 삭제 실패: {}", id)
    }
}

async fn connect(sync: Arc<VectorStoreSync>, id: &str, local: bool) -> Result<ChatBot> {
    let llm = Arc::new(
        OpenAiChat::from_settings(sync.settings()).context("Failed to create chat client")?,
    );
    let source = if local { IndexSource::Local } else { IndexSource::Remote };

    Ok(ChatBot::connect(sync, llm, id, source).await?)
}

/// 질문 하나에 답하고 세션 종료
///
/// 질문이나 답변 스트림이 실패해도 `close`는 항상 호출됩니다.
async fn ask_and_close<W: Write>(bot: ChatBot, question: &str, out: &mut W) -> Result<()> {
    let result = match bot.ask(question).await {
        Ok(stream) => print_stream(stream, out).await,
        Err(e) => Err(e.into()),
    };
    bot.close().await?;
    result
}

/// 표준 입력에서 질문을 읽어 답변
async fn chat_loop(bot: &ChatBot) -> Result<()> {
    println!("[*] {} 챗봇 (빈 줄로 종료)", bot.product_id());

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        print_stream(bot.ask(question).await?, &mut stdout).await?;
    }

    Ok(())
}

/// 답변 조각을 도착하는 대로 출력
///
/// 조각 80개마다 줄을 바꾸고, 마지막 줄이 열려 있으면 닫습니다.
async fn print_stream<W: Write>(mut stream: AnswerStream, out: &mut W) -> Result<()> {
    let mut count = 0;

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        write!(out, "{}", fragment)?;
        out.flush()?;

        count += 1;
        if count % FRAGMENTS_PER_LINE == 0 {
            writeln!(out)?;
        }
    }

    if count == 0 || count % FRAGMENTS_PER_LINE != 0 {
        writeln!(out)?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
