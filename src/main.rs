use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use bi_intent_corpus::config::{load_tables, LoadedConfig};
use bi_intent_corpus::convert::CorpusConverter;
use bi_intent_corpus::corpus::write_json_atomic;
use bi_intent_corpus::models::OpenAiBackend;
use bi_intent_corpus::pipeline::{
    builtin_questions, init_default_config, load_question_file, render_probe_summary,
    LabelOverrides, LabelWindow, LabelingPipeline, PipelineConfig,
};
use bi_intent_corpus::progress::ConsoleProgress;
use bi_intent_corpus::quality::{render_report, QualityAnalyzer};
use bi_intent_corpus::questions::combine_question_files;

const DEFAULT_CONVERT_INPUT: &str = "kaggle_spider_training_data.json";
const DEFAULT_CONVERT_OUTPUT: &str = "bi_training_data.json";
const DEFAULT_REPORT: &str = "bi_training_data_analysis.json";
const DEFAULT_PROBE_OUTPUT: &str = "test_llm_results.json";

#[derive(Parser, Debug)]
#[command(name = "bi-intent-corpus")]
#[command(about = "Convert, analyze and LLM-label BI intent training corpora", long_about = None)]
struct Args {
    /// Generate default config, prompt and vocabulary files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: search for bi-intent-corpus.toml upwards)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Suppress progress output on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite a generic corpus into the BI vocabulary
    Convert {
        #[arg(short, long, value_name = "JSON")]
        input: Option<PathBuf>,
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
        /// Original/converted question pairs to print afterwards
        #[arg(long)]
        samples: Option<usize>,
        /// Vocabulary/normalizer table TOML (default: built-in tables)
        #[arg(long, value_name = "TOML")]
        vocabulary: Option<PathBuf>,
    },
    /// Score a converted corpus and write a JSON report
    Analyze {
        #[arg(short, long, value_name = "JSON")]
        input: Option<PathBuf>,
        #[arg(short, long, value_name = "JSON")]
        report: Option<PathBuf>,
    },
    /// Re-label a corpus through the completion endpoint
    Label {
        #[arg(short, long, value_name = "JSON")]
        input: Option<PathBuf>,
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
        /// First example index (inclusive)
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Last example index (exclusive; default: end of corpus)
        #[arg(long)]
        end: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        checkpoint_every: Option<usize>,
        #[arg(long)]
        max_attempts: Option<u32>,
        #[arg(long)]
        model: Option<String>,
        /// Directory of .json model files pasted into the prompt
        #[arg(long, value_name = "DIR")]
        model_dir: Option<PathBuf>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Label a few questions and print intent / step counts
    Probe {
        /// One question per line (default: built-in probe set)
        #[arg(long, value_name = "TXT")]
        questions: Option<PathBuf>,
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, value_name = "DIR")]
        model_dir: Option<PathBuf>,
    },
    /// Merge an existing and a generated question list
    CombineQuestions {
        #[arg(long, value_name = "TXT")]
        existing: PathBuf,
        #[arg(long, value_name = "TXT")]
        generated: PathBuf,
        #[arg(short, long, value_name = "TXT")]
        output: PathBuf,
        /// Number for the first generated question (default: after the existing ones)
        #[arg(long)]
        first_number: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let Some(command) = args.command else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nTIPS:\n  - Default config search: bi-intent-corpus.toml (upwards), or set BI_INTENT_CORPUS_CONFIG.\n  - Run with --init-config to write a starter config.\n"
        );
        return Ok(());
    };

    let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let cfg = LoadedConfig::locate(args.config, &workdir).context("load config")?;

    match command {
        Command::Convert {
            input,
            output,
            samples,
            vocabulary,
        } => {
            let section = &cfg.file.convert;
            let input = pick(&cfg, input, section.input.as_deref(), DEFAULT_CONVERT_INPUT);
            let output = pick(&cfg, output, section.output.as_deref(), DEFAULT_CONVERT_OUTPUT);
            let samples = samples.or(section.samples).unwrap_or(5);
            let vocab_path =
                vocabulary.or_else(|| section.vocabulary.as_ref().map(|p| cfg.resolve(p)));

            let (vocab, normalizer) = load_tables(vocab_path.as_deref()).context("load tables")?;
            let summary = CorpusConverter::new(&vocab, &normalizer)
                .run(&input, &output, samples, &progress)?;
            progress.info(format!("Converted {} examples", summary.converted));
            for (i, (before, after)) in summary.samples.iter().enumerate() {
                eprintln!("\nExample {}:\n  Original: {before}\n  BI:       {after}", i + 1);
            }
        }
        Command::Analyze { input, report } => {
            let section = &cfg.file.analyze;
            let input = pick(&cfg, input, section.input.as_deref(), DEFAULT_CONVERT_OUTPUT);
            let report_path = pick(&cfg, report, section.report.as_deref(), DEFAULT_REPORT);
            let analyzer = QualityAnalyzer {
                thresholds: section.score.clone().unwrap_or_default(),
                ..QualityAnalyzer::default()
            };
            let report = analyzer.run(&input, &report_path, &progress)?;
            eprint!("{}", render_report(&report));
        }
        Command::Label {
            input,
            output,
            start,
            end,
            batch_size,
            checkpoint_every,
            max_attempts,
            model,
            model_dir,
            yes,
        } => {
            let pcfg = PipelineConfig::from_loaded(
                &cfg,
                LabelOverrides {
                    input,
                    output,
                    model,
                    model_dir,
                    batch_size,
                    checkpoint_every,
                    max_attempts,
                },
            )
            .context("build config")?;
            let backend = OpenAiBackend::new(pcfg.llm.openai_settings()?)?;

            eprintln!("Input file:  {}", pcfg.input.display());
            eprintln!("Output file: {}", pcfg.output.display());
            eprintln!("Model:       {}", pcfg.llm.model);
            eprintln!(
                "Window:      {start}..{}",
                end.map(|e| e.to_string()).unwrap_or_else(|| "end".to_string())
            );
            eprintln!("Batch size:  {}", pcfg.batch_size);
            if !yes && !confirm("Continue with processing? (y/n): ")? {
                eprintln!("Processing cancelled.");
                return Ok(());
            }

            let mut pipeline = LabelingPipeline::from_config(&pcfg, backend, progress)?;
            let summary = pipeline.run(&pcfg.input, &pcfg.output, LabelWindow { start, end })?;
            eprintln!(
                "\nProcessed {} examples ({} labeled, {} fallback, {} kept original, {} checkpoints)",
                summary.processed,
                summary.labeled,
                summary.fallbacks,
                summary.kept_original,
                summary.checkpoints
            );
            if !summary.issues.is_empty() {
                eprintln!("Issues ({}):", summary.issues.len());
                for issue in summary.issues.iter().take(20) {
                    eprintln!("  - {issue}");
                }
                if summary.issues.len() > 20 {
                    eprintln!("  ... and {} more", summary.issues.len() - 20);
                }
            }
        }
        Command::Probe {
            questions,
            output,
            model,
            model_dir,
        } => {
            let questions = match questions {
                Some(p) => load_question_file(&p)?,
                None => builtin_questions(),
            };
            let output = output.unwrap_or_else(|| PathBuf::from(DEFAULT_PROBE_OUTPUT));
            let pcfg = PipelineConfig::from_loaded(
                &cfg,
                LabelOverrides {
                    model,
                    model_dir,
                    ..LabelOverrides::default()
                },
            )
            .context("build config")?;
            let backend = OpenAiBackend::new(pcfg.llm.openai_settings()?)?;
            let mut pipeline = LabelingPipeline::from_config(&pcfg, backend, progress)?;
            let results = pipeline.probe(&questions)?;
            write_json_atomic(&output, &results)?;
            eprintln!("Results saved to: {}", output.display());
            eprint!("{}", render_probe_summary(&results, questions.len()));
        }
        Command::CombineQuestions {
            existing,
            generated,
            output,
            first_number,
        } => {
            let n = combine_question_files(&existing, &generated, &output, first_number)?;
            progress.info(format!("Combined {n} questions: {}", output.display()));
        }
    }
    Ok(())
}

/// CLI value, then the config value (relative to the config file), then a default name.
fn pick(cfg: &LoadedConfig, cli: Option<PathBuf>, file: Option<&Path>, default: &str) -> PathBuf {
    cli.or_else(|| file.map(|p| cfg.resolve(p)))
        .unwrap_or_else(|| PathBuf::from(default))
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    eprint!("{prompt}");
    io::stderr().flush().context("flush stderr")?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("read answer")?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}
