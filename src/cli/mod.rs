//! CLI 모듈
//!
//! booking-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::analytics::AnalyticsReport;
use crate::answer::AnswerService;
use crate::config::{describe_path, has_api_token, Config};
use crate::dataset::{preprocess, Dataset};
use crate::embedding::{create_embedder, DEFAULT_DIMENSION};
use crate::index::{build_index, IndexManifest, LanceVectorStore, VectorStore};
use crate::llm::HuggingFaceChat;
use crate::retrieval::Retriever;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "booking-rag")]
#[command(version, about = "호텔 예약 분석 및 RAG 질의응답", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 원본 CSV를 정제하여 저장
    Preprocess {
        /// 원본 CSV 경로
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// 정제된 CSV 경로
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 데이터셋 전체를 임베딩하여 유사도 인덱스 생성
    BuildIndex {
        /// 정제된 데이터셋 CSV
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// 인덱스 디렉토리
        #[arg(short, long)]
        index: Option<PathBuf>,
    },

    /// 질의와 비슷한 예약 레코드 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 예약 데이터에 대해 질문 (질문이 없으면 대화형)
    Ask {
        /// 질문
        question: Option<String>,
    },

    /// 매출 추이, 취소율, 국가 분포, 리드타임 분포 출력
    Analytics {
        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// HTTP 서버 실행
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Preprocess { input, output } => {
            if let Some(input) = input {
                config.raw_path = input;
            }
            if let Some(output) = output {
                config.data_path = output;
            }
            cmd_preprocess(&config)
        }
        Commands::BuildIndex { data, index } => {
            if let Some(data) = data {
                config.data_path = data;
            }
            if let Some(index) = index {
                config.index_path = index;
            }
            cmd_build_index(&config).await
        }
        Commands::Search { query, limit } => cmd_search(&config, &query, limit).await,
        Commands::Ask { question } => cmd_ask(&config, question).await,
        Commands::Analytics { json } => cmd_analytics(&config, json),
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            crate::server::serve(config).await
        }
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 토큰이 없으면 안내와 함께 실패
fn require_token() -> Result<()> {
    if !has_api_token() {
        bail!(
            "Hugging Face 토큰이 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export HUGGINGFACE_TOKEN=hf_...\n  \
             또는\n  \
             export HF_TOKEN=hf_...\n\n\
             토큰 발급: https://huggingface.co/settings/tokens"
        );
    }
    Ok(())
}

/// 데이터셋과 빌드된 인덱스로 Retriever 구성
async fn open_retriever(config: &Config) -> Result<Retriever> {
    let dataset = Dataset::load(&config.data_path)?;
    let store = LanceVectorStore::open_existing(&config.index_path)
        .await
        .context("인덱스 열기 실패 (먼저 build-index를 실행하세요)")?;
    let embedder = create_embedder(config)?;

    Ok(Retriever::new(
        Arc::new(dataset),
        Arc::new(store),
        Arc::new(embedder),
    ))
}

/// 전처리 명령어 (preprocess)
fn cmd_preprocess(config: &Config) -> Result<()> {
    println!("[*] 전처리 중: {}", config.raw_path.display());

    let report = preprocess(&config.raw_path, &config.data_path).context("전처리 실패")?;

    println!("[OK] 정제된 데이터 저장: {}", report.output_path.display());
    println!(
        "     입력 {} 행 → 출력 {} 행 (제외 {}, 채운 셀 {})",
        report.input_rows, report.output_rows, report.dropped_rows, report.filled_cells
    );
    Ok(())
}

/// 인덱스 빌드 명령어 (build-index)
async fn cmd_build_index(config: &Config) -> Result<()> {
    require_token()?;

    println!("[*] 임베딩 생성 중: {}", config.data_path.display());
    let embedder = Arc::new(create_embedder(config)?);
    let start = Instant::now();

    let report = build_index(&config.data_path, &config.index_path, embedder)
        .await
        .context("인덱스 빌드 실패")?;

    println!(
        "[OK] 인덱스 저장: {} ({} 벡터, {} 배치, {:.1}초)",
        config.index_path.display(),
        report.vectors,
        report.batches,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    require_token()?;

    println!("[*] 검색 중: \"{}\"", query);
    let retriever = open_retriever(config).await?;
    let results = retriever.retrieve(query, limit).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [거리: {:.4}] Row #{}",
            i + 1,
            result.distance,
            result.row
        );
        println!("   요약: {}", result.record.summary());
        let json = retriever.dataset().record_json(result.record).to_string();
        println!("   레코드: {}", truncate_text(&json, 200));
        println!();
    }

    Ok(())
}

/// 질의응답 명령어 (ask)
///
/// 질문이 주어지면 한 번 답하고, 없으면 `exit`을 입력할 때까지 반복합니다.
async fn cmd_ask(config: &Config, question: Option<String>) -> Result<()> {
    require_token()?;

    let retriever = open_retriever(config).await?;
    let llm = Arc::new(HuggingFaceChat::from_config(config)?);
    let service = AnswerService::new(Arc::new(retriever), llm, config);

    if let Some(question) = question {
        return ask_once(&service, &question).await;
    }

    println!("예약 데이터에 대해 질문하세요 (종료: exit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();

        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        // 한 질문의 실패로 루프를 끝내지 않음
        if let Err(e) = ask_once(&service, question).await {
            println!("[!] 답변 실패: {:#}", e);
        }
    }

    Ok(())
}

async fn ask_once(service: &AnswerService, question: &str) -> Result<()> {
    let outcome = service.answer_detailed(question).await?;

    println!("\n{}", outcome.answer.trim());
    println!(
        "\n(응답 시간: {:.4}초, 컨텍스트 {}/{} 건)",
        outcome.elapsed.as_secs_f64(),
        outcome.used_in_context,
        outcome.retrieved
    );
    Ok(())
}

/// 분석 명령어 (analytics)
fn cmd_analytics(config: &Config, json: bool) -> Result<()> {
    let dataset = Dataset::load(&config.data_path)?;
    let report = AnalyticsReport::compute(&dataset).context("분석 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("[OK] {} 건 분석\n", dataset.len());

    println!("월별 매출:");
    for point in &report.revenue_trends {
        println!("  {}  {:>14.2}", point.month, point.revenue);
    }

    println!("\n취소율: {:.2}%", report.cancellation_rate);

    println!("\n예약 상위 국가:");
    for (i, entry) in report.geographical_distribution.iter().enumerate() {
        println!("  {:>2}. {:<8} {}", i + 1, entry.country, entry.bookings);
    }

    let lead = &report.lead_time_distribution;
    println!("\n리드타임 분포 ({} 구간):", lead.bins.len());
    if let (Some(first), Some(last)) = (lead.bins.first(), lead.bins.last()) {
        println!("  범위: {:.0} ~ {:.0}일", first.start, last.end);
    }
    if let Some(peak) = lead.bins.iter().max_by_key(|bin| bin.count) {
        println!(
            "  최빈 구간: {:.1} ~ {:.1}일 ({} 건)",
            peak.start, peak.end, peak.count
        );
    }
    match lead.bandwidth {
        Some(bw) => println!("  KDE 대역폭: {:.3} ({} 점)", bw, lead.density.len()),
        None => println!("  KDE: 분산이 0이라 생략"),
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
async fn cmd_status(config: &Config) -> Result<()> {
    println!("booking-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 원본 데이터: {}", describe_path(&config.raw_path));
    println!("[*] 정제 데이터: {}", describe_path(&config.data_path));
    println!("[*] 인덱스: {}", describe_path(&config.index_path));
    println!("[*] 모델: {} / {}", config.chat_model, config.embedding_model);

    // 토큰 상태
    if has_api_token() {
        println!("[OK] Hugging Face 토큰: 설정됨");
    } else {
        println!("[!] Hugging Face 토큰: 미설정");
        println!("    설정: export HUGGINGFACE_TOKEN=hf_...");
    }

    // 데이터셋
    let dataset = match Dataset::load(&config.data_path) {
        Ok(dataset) => {
            let size = std::fs::metadata(&config.data_path)
                .map(|m| m.len() as usize)
                .unwrap_or(0);
            println!(
                "[OK] 데이터셋: {} 건 ({})",
                dataset.len(),
                format_bytes(size)
            );
            Some(dataset)
        }
        Err(e) => {
            println!("[!] 데이터셋 로드 실패: {:#}", e);
            None
        }
    };

    // 인덱스
    match LanceVectorStore::open_existing(&config.index_path).await {
        Ok(store) => {
            match store.count().await {
                Ok(count) => println!("[OK] 인덱스 벡터: {} 개", count),
                Err(e) => println!("[!] 인덱스 조회 실패: {:#}", e),
            }
            match IndexManifest::read(&config.index_path) {
                Ok(manifest) => {
                    println!(
                        "     빌드: {} ({}, {}차원)",
                        manifest.built_at.format("%Y-%m-%d %H:%M"),
                        manifest.embedding_model,
                        manifest.dimension
                    );
                    if let Some(dataset) = &dataset {
                        match check_manifest(&manifest, dataset, config) {
                            Ok(()) => println!("[OK] 인덱스가 데이터셋과 일치합니다"),
                            Err(e) => println!("[!] {:#}", e),
                        }
                    }
                }
                Err(e) => println!("[!] 매니페스트 없음: {:#}", e),
            }
        }
        Err(_) => {
            println!("[!] 인덱스 없음 (build-index로 생성)");
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 매니페스트가 현재 데이터셋과 설정된 임베딩 모델/차원에 맞는지 확인
fn check_manifest(manifest: &IndexManifest, dataset: &Dataset, config: &Config) -> Result<()> {
    manifest.verify(dataset, &config.embedding_model, DEFAULT_DIMENSION)
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
