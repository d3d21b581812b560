use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use zonerag_answer::{answer, explain_strategies, source_file_name, GeminiGenerator};
use zonerag_core::chunker::Chunker;
use zonerag_core::config::{resolve_with_base, ChunkingConfig, Settings};
use zonerag_core::loader::load_parsed_dir;
use zonerag_core::tokenize::HfTokenizer;
use zonerag_core::traits::Tokenizer;
use zonerag_core::types::{Chunk, ParsedDocument, PropertyContext, ScoredChunk};
use zonerag_embed::{service_from_config, EmbeddingAdapter};
use zonerag_retrieve::{CitationTable, Retriever};
use zonerag_rules::{evaluate, load_rules, Eligibility, RuleTable, StrategyVerdict};
use zonerag_vector::{build_index, open_index, IndexHandle};

/// Settings plus the directory relative paths resolve against.
pub struct App {
    pub settings: Settings,
    pub base: PathBuf,
    pub json: bool,
}

impl App {
    fn index_path(&self) -> PathBuf {
        self.settings.data.index_path(&self.base)
    }

    fn adapter(&self) -> Result<EmbeddingAdapter> {
        let service = service_from_config(&self.settings.embedding)?;
        Ok(EmbeddingAdapter::from_config(service, &self.settings.embedding))
    }

    fn rules(&self) -> Result<RuleTable> {
        let path = self.settings.rules.path.as_deref().map(|p| resolve_with_base(&self.base, p));
        Ok(load_rules(path.as_deref())?)
    }

    /// Open the persisted index for querying with the configured embedder.
    fn retriever(&self) -> Result<Retriever> {
        let adapter = self.adapter()?;
        let path = self.index_path();
        let handle = Arc::new(IndexHandle::new());
        open_index(&path, &handle)
            .with_context(|| format!("cannot open index at {}; run `zonerag index` first", path.display()))?;
        let index = handle.snapshot()?;
        if index.embedder_id() != adapter.embedder_id() {
            anyhow::bail!(
                "index at {} was built with '{}' but '{}' is configured; rebuild with `zonerag index`",
                path.display(),
                index.embedder_id(),
                adapter.embedder_id()
            );
        }
        Ok(Retriever::new(adapter, handle, &self.settings.retrieval))
    }
}

pub async fn index(app: &App, parsed_dir: Option<PathBuf>) -> Result<()> {
    let dir = parsed_dir.unwrap_or_else(|| app.settings.data.parsed_dir(&app.base));
    let corpus = load_parsed_dir(&dir)?;
    let (chunks, skipped_pages) = chunk_corpus(&corpus.documents, &app.settings.chunking, &app.base)?;
    if chunks.is_empty() {
        anyhow::bail!("no chunks produced from {}", dir.display());
    }

    let adapter = app.adapter()?;
    let handle = IndexHandle::new();
    let report = build_index(chunks, &adapter, &app.index_path(), &handle).await?;

    if app.json {
        let out = json!({
            "documents": corpus.documents.len(),
            "skipped_files": corpus.skipped.len(),
            "skipped_pages": skipped_pages,
            "chunks": report.chunks,
            "dim": report.dim,
            "embedder_id": report.embedder_id,
            "artifact_path": report.artifact_path,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Indexed {} documents from {}", corpus.documents.len(), dir.display());
        if !corpus.skipped.is_empty() || skipped_pages > 0 {
            println!("  skipped: {} files, {} pages (see log)", corpus.skipped.len(), skipped_pages);
        }
        println!("  chunks:   {}", report.chunks);
        println!("  embedder: {} (d={})", report.embedder_id, report.dim);
        println!("✅ Index written to {}", report.artifact_path.display());
    }
    Ok(())
}

pub async fn query(app: &App, text: &str, city: &str, zoning: Option<&str>, k: Option<usize>) -> Result<()> {
    let retriever = app.retriever()?;
    let k = k.unwrap_or(app.settings.retrieval.top_k);
    let result = retriever.retrieve(text, city, zoning, k).await?;

    if app.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("Found {} results for \"{text}\" in {city}", result.hits.len());
    if result.underfilled {
        println!("  (fewer than {k} excerpts exist for this scope; the search was not widened)");
    }
    print_hits(&result.hits);
    Ok(())
}

pub async fn evaluate_property(app: &App, property: &str, explain: bool) -> Result<()> {
    let ctx = parse_property(property)?;
    let rules = app.rules()?;
    let generator = if explain { Some(GeminiGenerator::from_config(&app.settings.generation)?) } else { None };
    let citations = if app.index_path().is_file() {
        app.retriever()?.collect_citations(&ctx, &rules, app.settings.retrieval.citation_k).await?
    } else {
        tracing::warn!(target: "rules", "no index at {}; verdicts will carry no citations", app.index_path().display());
        CitationTable::new()
    };
    let verdicts = evaluate(&ctx, &rules, &citations);

    let Some(generator) = generator else {
        if app.json {
            println!("{}", serde_json::to_string_pretty(&verdicts)?);
        } else {
            println!("Property: {}", ctx.address);
            print_verdicts(&verdicts);
        }
        return Ok(());
    };

    let explanations = explain_strategies(&generator, &verdicts, &ctx).await?;
    if app.json {
        println!("{}", serde_json::to_string_pretty(&explanations)?);
        return Ok(());
    }
    println!("Property: {}", ctx.address);
    for e in &explanations {
        print_verdicts(std::slice::from_ref(&e.verdict));
        println!("\n{}\n", e.explanation);
    }
    Ok(())
}

pub async fn ask(app: &App, question: &str, property: &str, k: Option<usize>) -> Result<()> {
    let ctx = parse_property(property)?;
    let city = ctx.city().context("property context has no city; cannot scope the search")?;
    let rules = app.rules()?;
    let retriever = app.retriever()?;
    let generator = GeminiGenerator::from_config(&app.settings.generation)?;

    let citations = retriever.collect_citations(&ctx, &rules, app.settings.retrieval.citation_k).await?;
    let verdicts = evaluate(&ctx, &rules, &citations);
    let k = k.unwrap_or(app.settings.retrieval.top_k);
    let retrieval = retriever.retrieve(question, city, ctx.zoning_label(), k).await?;

    let result = answer(&generator, question, &ctx, verdicts, &retrieval.hits).await?;
    if app.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("{}\n", result.answer);
    print_verdicts(&result.verdicts);
    if !result.evidence.is_empty() {
        println!("\nEvidence:");
        for (i, e) in result.evidence.iter().enumerate() {
            println!("  {}. {} page {} lines {}", i + 1, e.source_file, e.page_number, e.line_range);
        }
    }
    Ok(())
}

pub fn status(app: &App) -> Result<()> {
    let path = app.index_path();
    let index = if path.is_file() {
        let handle = IndexHandle::new();
        open_index(&path, &handle)?;
        Some(handle.snapshot()?)
    } else {
        None
    };
    let rules = app.rules()?;

    if app.json {
        let out = json!({
            "parsed_dir": app.settings.data.parsed_dir(&app.base),
            "index_path": path,
            "index": index.as_ref().map(|i| json!({
                "embedder_id": i.embedder_id(),
                "built_at": i.built_at(),
                "dim": i.dim(),
                "chunks": i.len(),
            })),
            "strategies": rules.strategies().iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "citation_topics": rules.citation_topics(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Parsed documents: {}", app.settings.data.parsed_dir(&app.base).display());
    match &index {
        Some(i) => println!(
            "Index: {} ({} chunks, d={}, {}, built {})",
            path.display(),
            i.len(),
            i.dim(),
            i.embedder_id(),
            i.built_at().format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("Index: not built ({} missing)", path.display()),
    }
    println!("Embedding: {:?} {}", app.settings.embedding.provider, app.settings.embedding.model);
    println!("Rules: {} strategies", rules.strategies().len());
    for s in rules.strategies() {
        println!("  - {}: {} clause(s)", s.name, s.clauses.len());
    }
    Ok(())
}

/// Chunk every document; returns the chunks and the number of skipped pages.
fn chunk_corpus(docs: &[ParsedDocument], config: &ChunkingConfig, base: &Path) -> Result<(Vec<Chunk>, usize)> {
    match &config.tokenizer_path {
        Some(p) => {
            let tokenizer = HfTokenizer::from_file(&resolve_with_base(base, p))?;
            Ok(chunk_with(&Chunker::with_tokenizer(tokenizer, config.clone())?, docs))
        }
        None => Ok(chunk_with(&Chunker::new(config.clone())?, docs)),
    }
}

fn chunk_with<T: Tokenizer>(chunker: &Chunker<T>, docs: &[ParsedDocument]) -> (Vec<Chunk>, usize) {
    let mut chunks = Vec::new();
    let mut skipped = 0;
    for doc in docs {
        let out = chunker.chunk(doc);
        skipped += out.skipped.len();
        chunks.extend(out.chunks);
    }
    (chunks, skipped)
}

/// Inline JSON when the argument starts with `{`, otherwise a file path.
pub fn parse_property(arg: &str) -> Result<PropertyContext> {
    let raw = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        fs::read_to_string(arg).with_context(|| format!("reading property file {arg}"))?
    };
    let ctx: PropertyContext = serde_json::from_str(&raw).context("property context is not valid JSON")?;
    if ctx.address.trim().is_empty() {
        anyhow::bail!("property context needs an address");
    }
    Ok(ctx)
}

fn print_hits(hits: &[ScoredChunk]) {
    for (i, h) in hits.iter().enumerate() {
        println!(
            "\n  {}. score={:.4}  {} page {} lines {}  [{}]",
            i + 1,
            h.score,
            source_file_name(&h.chunk.source_document_id),
            h.chunk.page_number,
            h.chunk.line_range,
            h.chunk.zoning_label.as_deref().unwrap_or("unzoned")
        );
        println!("     {}", h.chunk.preview(240).replace('\n', " "));
    }
}

fn print_verdicts(verdicts: &[StrategyVerdict]) {
    for v in verdicts {
        let label = match v.eligible {
            Eligibility::Yes => "yes",
            Eligibility::No => "no",
            Eligibility::Indeterminate => "indeterminate",
        };
        println!("{}: {label}", v.strategy_name);
        for c in &v.matched_rule_clauses {
            println!("  ✓ {c}");
        }
        for c in &v.failed_rule_clauses {
            println!("  ✗ {c}");
        }
        if !v.missing_attributes.is_empty() {
            println!("  ? missing: {}", v.missing_attributes.join(", "));
        }
        for c in &v.supporting_citations {
            println!("    {} page {} lines {}", source_file_name(&c.source_document_id), c.page_number, c.line_range);
        }
    }
}
