use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{ClipError, ConfigError, StageFailure};
use crate::segment::Segment;
use crate::stages::openai::OpenAiModels;
use crate::stages::{
    Analyzer, Cutter, FfmpegAudioExtractor, FfmpegCutter, Fetcher, FileIoPublisher,
    OpenAiAnalyzer, Publisher, Transcoder, YtDlpFetcher,
};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{JobPhase, ProgressEvent, ProgressReporter};

/// How long the HTTP clients wait for a TCP/TLS connection. The request as
/// a whole is bounded by the stage timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transcoder and analyzer are only used together.
struct Analysis {
    transcoder: Arc<dyn Transcoder>,
    analyzer: Arc<dyn Analyzer>,
}

/// The ordered stage sequence: fetch, then (transcode, analyze) when
/// analysis is configured, then cut and publish.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    fetcher: Arc<dyn Fetcher>,
    analysis: Option<Analysis>,
    cutter: Arc<dyn Cutter>,
    publisher: Arc<dyn Publisher>,
}

impl Pipeline {
    /// Production constructor: yt-dlp, ffmpeg, OpenAI and file.io adapters
    /// built from the config. Analysis is wired in only when it is enabled
    /// and an API key resolves.
    pub fn from_config(config: &Config) -> Result<Self, ClipError> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let fetcher = YtDlpFetcher::new(&config.tools.yt_dlp)
            .with_cookies_file(config.tools.cookies_path());

        let mut builder = PipelineBuilder::new(PipelineConfig::from_config(config))
            .fetcher(Arc::new(fetcher))
            .cutter(Arc::new(FfmpegCutter::new(&config.tools.ffmpeg)))
            .publisher(Arc::new(FileIoPublisher::new(
                client.clone(),
                &config.publish.endpoint,
            )));

        match config.analysis.resolve_api_key()? {
            Some(api_key) => {
                let models = OpenAiModels {
                    base_url: config.analysis.base_url.clone(),
                    transcription_model: config.analysis.transcription_model.clone(),
                    chat_model: config.analysis.model.clone(),
                };
                info!(model = %models.chat_model, "Highlight analysis enabled");
                builder = builder
                    .transcoder(Arc::new(FfmpegAudioExtractor::new(&config.tools.ffmpeg)))
                    .analyzer(Arc::new(OpenAiAnalyzer::new(client, api_key, models)));
            }
            None if config.analysis.enabled => {
                warn!("No OpenAI API key found; clips will use the fallback segment (0-15s)");
            }
            None => {
                info!("Highlight analysis disabled; clips will use the fallback segment (0-15s)");
            }
        }

        Ok(builder.build()?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_analysis(&self) -> bool {
        self.analysis.is_some()
    }

    /// Run every stage for one job. Returns the published reference, or the
    /// first stage failure; later stages are skipped after a failure.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (Result<String, PipelineError>, PipelineContext) {
        let span = info_span!("pipeline", job_id = %ctx.job_id);
        let result = self.run_steps(&mut ctx, progress).instrument(span).await;

        match &result {
            Ok(reference) => progress.report(ProgressEvent::Completed {
                result_reference: reference.clone(),
            }),
            Err(e) => progress.report(ProgressEvent::Failed {
                phase: e.phase,
                error: e.failure.to_string(),
            }),
        }
        (result, ctx)
    }

    async fn run_steps(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<String, PipelineError> {
        let timeouts = self.config.timeouts;

        // Step 1: Fetch
        progress.report(ProgressEvent::Phase {
            phase: JobPhase::Downloading,
            message: "Downloading source media...".to_string(),
        });
        let source = stage(
            JobPhase::Downloading,
            timeouts.fetch,
            self.fetcher.fetch(&ctx.source_reference, &ctx.scratch_dir),
        )
        .await?;
        ctx.source = Some(source.clone());

        // Step 2+3: Transcode and analyze, or fall back
        let segment = match &self.analysis {
            Some(analysis) => {
                progress.report(ProgressEvent::Phase {
                    phase: JobPhase::Transcoding,
                    message: "Extracting audio track...".to_string(),
                });
                let audio = stage(
                    JobPhase::Transcoding,
                    timeouts.transcode,
                    analysis.transcoder.transcode(&source, &ctx.scratch_dir),
                )
                .await?;
                ctx.audio = Some(audio.clone());

                progress.report(ProgressEvent::Phase {
                    phase: JobPhase::Analyzing,
                    message: "Selecting highlight...".to_string(),
                });
                let highlight = stage(
                    JobPhase::Analyzing,
                    timeouts.analyze,
                    analysis.analyzer.analyze(&audio),
                )
                .await?;
                let segment = Segment::from_highlight(&highlight)
                    .map_err(|f| PipelineError::new(JobPhase::Analyzing, f))?;
                ctx.highlight = Some(highlight);
                segment
            }
            None => {
                debug!("No analyzer configured, using fallback segment");
                Segment::fallback()
            }
        };

        // Step 4: Cut
        let segment = segment
            .clamp_to(source.duration)
            .map_err(|f| PipelineError::new(JobPhase::Cutting, f))?;
        progress.report(ProgressEvent::Phase {
            phase: JobPhase::Cutting,
            message: format!(
                "Cutting {:.1}s-{:.1}s...",
                segment.start(),
                segment.end()
            ),
        });
        ctx.segment = Some(segment);
        let output = ctx.clip_path();
        let clip = stage(
            JobPhase::Cutting,
            timeouts.cut,
            self.cutter.cut(&source, &segment, &output),
        )
        .await?;
        ctx.clip = Some(clip.clone());

        // Step 5: Publish
        progress.report(ProgressEvent::Phase {
            phase: JobPhase::Uploading,
            message: "Uploading clip...".to_string(),
        });
        let reference = stage(
            JobPhase::Uploading,
            timeouts.publish,
            self.publisher.publish(&clip),
        )
        .await?;
        if reference.trim().is_empty() {
            return Err(PipelineError::new(
                JobPhase::Uploading,
                StageFailure::InvalidResponse("publisher returned an empty reference".to_string()),
            ));
        }
        ctx.result_reference = Some(reference.clone());

        Ok(reference)
    }
}

/// Awaits one stage call under its timeout, in its own span.
async fn stage<T, F>(phase: JobPhase, limit: Duration, call: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, StageFailure>>,
{
    let span = info_span!("stage", phase = %phase);
    match tokio::time::timeout(limit, call).instrument(span).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(PipelineError::new(phase, failure)),
        Err(_) => Err(PipelineError::new(phase, StageFailure::Timeout(limit))),
    }
}

/// Assembles a [`Pipeline`] from individual adapters. Tests use it to
/// inject fakes; [`Pipeline::from_config`] uses it for the real ones.
pub struct PipelineBuilder {
    config: PipelineConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    transcoder: Option<Arc<dyn Transcoder>>,
    analyzer: Option<Arc<dyn Analyzer>>,
    cutter: Option<Arc<dyn Cutter>>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fetcher: None,
            transcoder: None,
            analyzer: None,
            cutter: None,
            publisher: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn cutter(mut self, cutter: Arc<dyn Cutter>) -> Self {
        self.cutter = Some(cutter);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Result<Pipeline, ConfigError> {
        let missing = |name: &str| ConfigError::Validation {
            message: format!("pipeline has no {} stage", name),
        };
        let analysis = match (self.transcoder, self.analyzer) {
            (Some(transcoder), Some(analyzer)) => Some(Analysis {
                transcoder,
                analyzer,
            }),
            (None, None) => None,
            (None, Some(_)) => return Err(missing("transcode")),
            (Some(_), None) => return Err(missing("analyze")),
        };
        Ok(Pipeline {
            config: Arc::new(self.config),
            fetcher: self.fetcher.ok_or_else(|| missing("fetch"))?,
            analysis,
            cutter: self.cutter.ok_or_else(|| missing("cut"))?,
            publisher: self.publisher.ok_or_else(|| missing("publish"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use crate::pipeline::config::StageTimeouts;
    use crate::pipeline::progress::NoopProgress;
    use crate::segment::Highlight;
    use crate::stages::MediaHandle;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FileFetcher {
        duration: Option<f64>,
    }

    #[async_trait]
    impl Fetcher for FileFetcher {
        async fn fetch(&self, _reference: &str, dest: &Path) -> Result<MediaHandle, StageFailure> {
            let path = dest.join("source.mp4");
            std::fs::write(&path, b"video").unwrap();
            Ok(MediaHandle::new(path).with_duration(self.duration))
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _reference: &str, _dest: &Path) -> Result<MediaHandle, StageFailure> {
            Err(StageFailure::Tool {
                program: "yt-dlp".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "ERROR: Video unavailable".to_string(),
            })
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl Fetcher for SlowFetcher {
        async fn fetch(&self, _reference: &str, _dest: &Path) -> Result<MediaHandle, StageFailure> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(StageFailure::other("unreachable"))
        }
    }

    struct CopyTranscoder;

    #[async_trait]
    impl Transcoder for CopyTranscoder {
        async fn transcode(
            &self,
            media: &MediaHandle,
            dest: &Path,
        ) -> Result<MediaHandle, StageFailure> {
            let path = dest.join("audio.mp3");
            std::fs::copy(&media.path, &path).unwrap();
            Ok(MediaHandle::new(path).with_duration(media.duration))
        }
    }

    struct FixedAnalyzer(Highlight);

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        async fn analyze(&self, _media: &MediaHandle) -> Result<Highlight, StageFailure> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingCutter {
        segments: Mutex<Vec<Segment>>,
    }

    #[async_trait]
    impl Cutter for RecordingCutter {
        async fn cut(
            &self,
            _media: &MediaHandle,
            segment: &Segment,
            output: &Path,
        ) -> Result<MediaHandle, StageFailure> {
            self.segments.lock().unwrap().push(*segment);
            std::fs::write(output, b"clip").unwrap();
            Ok(MediaHandle::new(output))
        }
    }

    struct StaticPublisher(&'static str);

    #[async_trait]
    impl Publisher for StaticPublisher {
        async fn publish(&self, media: &MediaHandle) -> Result<String, StageFailure> {
            assert!(media.path.exists());
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl RecordingProgress {
        fn phases(&self) -> Vec<JobPhase> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ProgressEvent::Phase { phase, .. } => Some(*phase),
                    _ => None,
                })
                .collect()
        }
    }

    fn test_config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            work_directory: dir.to_path_buf(),
            timeouts: StageTimeouts::uniform(Duration::from_secs(5)),
        }
    }

    fn highlight(start: f64, end: f64) -> Highlight {
        Highlight {
            start,
            end,
            summary: "test".to_string(),
        }
    }

    fn context(dir: &TempDir) -> PipelineContext {
        PipelineContext::new(JobId(1), "https://example.com/video", dir.path())
    }

    #[tokio::test]
    async fn test_fallback_pipeline_publishes_clip() {
        let tmp = TempDir::new().unwrap();
        let cutter = Arc::new(RecordingCutter::default());
        let pipeline = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(FileFetcher { duration: None }))
            .cutter(cutter.clone())
            .publisher(Arc::new(StaticPublisher("https://file.io/abc")))
            .build()
            .unwrap();
        assert!(!pipeline.has_analysis());

        let progress = RecordingProgress::default();
        let (result, ctx) = pipeline.run(context(&tmp), &progress).await;

        assert_eq!(result.unwrap(), "https://file.io/abc");
        assert_eq!(*cutter.segments.lock().unwrap(), vec![Segment::fallback()]);
        assert_eq!(ctx.clip_path(), tmp.path().join("clip-1.mp4"));
        assert!(ctx.highlight.is_none());
        assert_eq!(
            progress.phases(),
            vec![JobPhase::Downloading, JobPhase::Cutting, JobPhase::Uploading]
        );
    }

    #[tokio::test]
    async fn test_analysis_pipeline_uses_highlight() {
        let tmp = TempDir::new().unwrap();
        let cutter = Arc::new(RecordingCutter::default());
        let pipeline = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(FileFetcher { duration: Some(120.0) }))
            .transcoder(Arc::new(CopyTranscoder))
            .analyzer(Arc::new(FixedAnalyzer(highlight(30.0, 52.0))))
            .cutter(cutter.clone())
            .publisher(Arc::new(StaticPublisher("https://file.io/xyz")))
            .build()
            .unwrap();

        let progress = RecordingProgress::default();
        let (result, ctx) = pipeline.run(context(&tmp), &progress).await;

        assert_eq!(result.unwrap(), "https://file.io/xyz");
        assert_eq!(
            *cutter.segments.lock().unwrap(),
            vec![Segment::new(30.0, 52.0).unwrap()]
        );
        assert!(ctx.audio.is_some());
        assert_eq!(ctx.result_reference.as_deref(), Some("https://file.io/xyz"));
        assert_eq!(
            progress.phases(),
            vec![
                JobPhase::Downloading,
                JobPhase::Transcoding,
                JobPhase::Analyzing,
                JobPhase::Cutting,
                JobPhase::Uploading
            ]
        );
    }

    #[tokio::test]
    async fn test_inverted_highlight_fails_before_cutting() {
        let tmp = TempDir::new().unwrap();
        let cutter = Arc::new(RecordingCutter::default());
        let pipeline = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(FileFetcher { duration: None }))
            .transcoder(Arc::new(CopyTranscoder))
            .analyzer(Arc::new(FixedAnalyzer(highlight(40.0, 20.0))))
            .cutter(cutter.clone())
            .publisher(Arc::new(StaticPublisher("https://file.io/never")))
            .build()
            .unwrap();

        let (result, ctx) = pipeline.run(context(&tmp), &NoopProgress).await;

        let err = result.unwrap_err();
        assert_eq!(err.phase, JobPhase::Analyzing);
        assert!(matches!(err.failure, StageFailure::InvalidSegment(_)));
        assert!(cutter.segments.lock().unwrap().is_empty());
        assert!(ctx.result_reference.is_none());
    }

    #[tokio::test]
    async fn test_segment_is_clamped_to_source_duration() {
        let tmp = TempDir::new().unwrap();
        let cutter = Arc::new(RecordingCutter::default());
        let pipeline = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(FileFetcher { duration: Some(9.0) }))
            .cutter(cutter.clone())
            .publisher(Arc::new(StaticPublisher("https://file.io/short")))
            .build()
            .unwrap();

        let progress = RecordingProgress::default();
        let (result, _) = pipeline.run(context(&tmp), &progress).await;
        assert!(result.is_ok());
        assert_eq!(
            *cutter.segments.lock().unwrap(),
            vec![Segment::new(0.0, 9.0).unwrap()]
        );
        let events = progress.events.lock().unwrap();
        let cutting = events.iter().find_map(|e| match e {
            ProgressEvent::Phase {
                phase: JobPhase::Cutting,
                message,
            } => Some(message.clone()),
            _ => None,
        });
        assert_eq!(cutting.as_deref(), Some("Cutting 0.0s-9.0s..."));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_remaining_stages() {
        let tmp = TempDir::new().unwrap();
        let cutter = Arc::new(RecordingCutter::default());
        let pipeline = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(FailingFetcher))
            .cutter(cutter.clone())
            .publisher(Arc::new(StaticPublisher("https://file.io/never")))
            .build()
            .unwrap();

        let progress = RecordingProgress::default();
        let (result, ctx) = pipeline.run(context(&tmp), &progress).await;

        let err = result.unwrap_err();
        assert_eq!(err.phase, JobPhase::Downloading);
        assert!(err.to_string().contains("Video unavailable"));
        assert!(ctx.source.is_none());
        assert!(cutter.segments.lock().unwrap().is_empty());
        assert!(matches!(
            progress.events.lock().unwrap().last(),
            Some(ProgressEvent::Failed { phase: JobPhase::Downloading, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_fails_the_run() {
        let tmp = TempDir::new().unwrap();
        let pipeline = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(SlowFetcher))
            .cutter(Arc::new(RecordingCutter::default()))
            .publisher(Arc::new(StaticPublisher("https://file.io/never")))
            .build()
            .unwrap();

        let (result, _) = pipeline.run(context(&tmp), &NoopProgress).await;
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.phase, JobPhase::Downloading);
    }

    #[tokio::test]
    async fn test_empty_reference_is_a_publish_failure() {
        let tmp = TempDir::new().unwrap();
        let pipeline = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(FileFetcher { duration: None }))
            .cutter(Arc::new(RecordingCutter::default()))
            .publisher(Arc::new(StaticPublisher("")))
            .build()
            .unwrap();

        let (result, _) = pipeline.run(context(&tmp), &NoopProgress).await;
        assert_eq!(result.unwrap_err().phase, JobPhase::Uploading);
    }

    #[test]
    fn test_builder_requires_core_stages() {
        let tmp = TempDir::new().unwrap();
        assert!(PipelineBuilder::new(test_config(tmp.path()))
            .cutter(Arc::new(RecordingCutter::default()))
            .publisher(Arc::new(StaticPublisher("x")))
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_requires_transcoder_with_analyzer() {
        let tmp = TempDir::new().unwrap();
        let result = PipelineBuilder::new(test_config(tmp.path()))
            .fetcher(Arc::new(FileFetcher { duration: None }))
            .analyzer(Arc::new(FixedAnalyzer(highlight(0.0, 10.0))))
            .cutter(Arc::new(RecordingCutter::default()))
            .publisher(Arc::new(StaticPublisher("x")))
            .build();
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_from_config_without_analysis() {
        let config = crate::config::load_config_from_str(
            r#"{ "version": "1.0", "analysis": { "enabled": false } }"#,
        )
        .unwrap();
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert!(!pipeline.has_analysis());
        assert_eq!(pipeline.config().work_directory, PathBuf::from("temp"));
    }

    #[test]
    fn test_from_config_with_direct_api_key() {
        let config = crate::config::load_config_from_str(
            r#"{ "version": "1.0", "analysis": { "api_key": "sk-test" } }"#,
        )
        .unwrap();
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert!(pipeline.has_analysis());
    }
}
