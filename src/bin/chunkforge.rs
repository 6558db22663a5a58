//! Pipeline driver: runs the corpus-construction phases end to end or one
//! at a time.
//!
//! ```bash
//! chunkforge extract   # dataset files -> allow-list artifacts
//! chunkforge filter    # gzip dump -> filtered JSONL
//! chunkforge chunk     # filtered docs + QA paragraphs -> chunk JSONL
//! chunkforge index     # chunk JSONL -> embedded sqlite-vec index
//! chunkforge all       # everything above, in order
//! ```
//!
//! Configuration comes from `CHUNKFORGE_*` environment variables (a `.env`
//! file is honored) layered over the compiled defaults; see
//! `chunkforge::config`. Embeddings use the deterministic mock provider
//! unless a real [`EmbeddingProvider`] is wired in here.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Instant;

use tracing::warn;
use tracing_subscriber::FmtSubscriber;

use chunkforge::assemble::{AssembleReport, ChunkAssembler, ChunkReader, ChunkWriter};
use chunkforge::config::PipelineConfig;
use chunkforge::dump::{AllowSet, WikiDoc, filter_dump_file};
use chunkforge::embed::{EmbedReport, EmbeddingBatcher, EmbeddingProvider, MockEmbeddingProvider};
use chunkforge::extract::{ParagraphRecord, extract_titles, scan_records, write_allow_list, write_match_list};
use chunkforge::segmenter::RecursiveSegmenter;
use chunkforge::stores::SqliteVectorIndex;
use chunkforge::types::CorpusError;

#[tokio::main]
async fn main() -> Result<(), CorpusError> {
    init_tracing();

    let config = PipelineConfig::builder().with_env().build()?;
    let phase = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let start = Instant::now();

    match phase.as_str() {
        "extract" => run_extract(&config)?,
        "filter" => run_filter(&config)?,
        "chunk" => run_chunk(&config)?,
        "index" => run_index(&config).await?,
        "all" => {
            run_extract(&config)?;
            run_filter(&config)?;
            run_chunk(&config)?;
            run_index(&config).await?;
        }
        other => {
            eprintln!("unknown phase '{other}' (expected extract|filter|chunk|index|all)");
            std::process::exit(2);
        }
    }

    println!("\ndone in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            )
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn run_extract(config: &PipelineConfig) -> Result<(), CorpusError> {
    let sources = config.dataset_sources();
    let (titles, report) = extract_titles(&sources)?;
    write_allow_list(&titles, &config.allow_list_path)?;
    write_match_list(&titles, &config.match_list_path)?;

    println!("extract:");
    println!("  records scanned : {}", report.records);
    println!("  identifiers     : {}", report.identifiers);
    println!("  skipped records : {}", report.skipped_records);
    println!("  missing files   : {}", report.missing_files);
    println!("  allow-list      : {}", config.allow_list_path.display());
    println!("  match list      : {}", config.match_list_path.display());
    Ok(())
}

fn run_filter(config: &PipelineConfig) -> Result<(), CorpusError> {
    let allow = AllowSet::load(&config.match_list_path)?;
    let report = filter_dump_file(&config.dump_path, &allow, &config.filtered_path)?;

    println!("filter:");
    println!("  lines scanned   : {}", report.scanned);
    println!("  docs retained   : {}", report.retained);
    println!("  invalid skipped : {}", report.skipped_invalid);
    println!("  output          : {}", config.filtered_path.display());
    Ok(())
}

fn run_chunk(config: &PipelineConfig) -> Result<(), CorpusError> {
    let segmenter = RecursiveSegmenter::new()
        .max_chars(config.chunk_size)
        .overlap(config.chunk_overlap);
    let assembler = ChunkAssembler::new(
        segmenter,
        config.min_section_chars,
        config.min_paragraph_chars,
    );
    let mut writer = ChunkWriter::create(&config.chunks_path)?;
    let mut report = AssembleReport::default();

    // Filtered dump documents (section-bearing family).
    let reader = BufReader::new(File::open(&config.filtered_path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<WikiDoc>(&line) {
            Ok(doc) => {
                for chunk in assembler.assemble_wiki_doc(&config.wiki_source_tag, &doc, &mut report)
                {
                    writer.write(&chunk)?;
                }
            }
            Err(_) => report.skipped_invalid += 1,
        }
    }

    // QA paragraphs (flat family), one pass per record.
    for (tag, path) in &config.paragraph_datasets {
        let mut write_err: Option<CorpusError> = None;
        scan_records(path, |record| {
            if write_err.is_some() {
                return;
            }
            match serde_json::from_value::<ParagraphRecord>(record) {
                Ok(example) => {
                    for chunk in assembler.assemble_paragraphs(
                        tag,
                        example.id.as_deref(),
                        &example.paragraphs,
                        &mut report,
                    ) {
                        if let Err(err) = writer.write(&chunk) {
                            write_err = Some(err);
                            break;
                        }
                    }
                }
                Err(_) => report.skipped_invalid += 1,
            }
        })?;
        if let Some(err) = write_err {
            return Err(err);
        }
    }

    let written = writer.finish()?;
    println!("chunk:");
    println!("  documents       : {}", report.documents);
    println!("  chunks written  : {written}");
    println!("  short skipped   : {}", report.skipped_short);
    println!("  invalid skipped : {}", report.skipped_invalid);
    println!("  output          : {}", config.chunks_path.display());
    Ok(())
}

async fn run_index(config: &PipelineConfig) -> Result<(), CorpusError> {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(
        MockEmbeddingProvider::new().with_dimensions(config.embedding_dimensions),
    );
    if config.embedding_model != provider.id() {
        warn!(
            requested = %config.embedding_model,
            "no provider wired for this model; using deterministic mock embeddings"
        );
    }
    let batcher = EmbeddingBatcher::new(Arc::clone(&provider), config.batch_size);

    if let Some(parent) = config.index_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let index = SqliteVectorIndex::open(&config.index_path, provider.dimensions()).await?;

    let mut reader = ChunkReader::open(&config.chunks_path)?;
    let mut report = EmbedReport::default();
    loop {
        let wave = reader.next_batch(config.batch_size)?;
        if wave.is_empty() {
            break;
        }
        let (embedded, wave_report) = batcher.embed_chunks(wave).await;
        index.add_embedded(embedded).await?;
        report.embedded += wave_report.embedded;
        report.dropped_batches += wave_report.dropped_batches;
        report.dropped_chunks += wave_report.dropped_chunks;
    }

    println!("index:");
    println!("  chunks embedded : {}", report.embedded);
    println!("  batches dropped : {}", report.dropped_batches);
    println!("  chunks dropped  : {}", report.dropped_chunks);
    println!("  malformed lines : {}", reader.skipped());
    println!("  index ntotal    : {}", index.ntotal().await?);
    println!("  database        : {}", config.index_path.display());
    Ok(())
}
