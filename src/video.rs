use crate::db_types::{Call, CallEventType, VideoStatus};
use crate::error::AppError;
use crate::storage::{RECORDINGS_BUCKET, VIDEOS_BUCKET};
use crate::types::AppState;

use futures_util::StreamExt;
use serde_json::json;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

const FPS: u32 = 60;
const INTRO_SECS: f64 = 2.0;
/// One bucket per 10ms of audio.
const WAVEFORM_POINTS_PER_SEC: u32 = 100;
const ANALYSIS_SAMPLE_RATE: u32 = 8_000;
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(120);
/// Stand-in when the recording cannot be analyzed.
const FALLBACK_DURATION_SECS: f64 = 30.0;

/// Render result as a value.  The pipeline never lets an error escape past
/// this boundary; the cron aggregates outcomes across the batch.
#[derive(Debug)]
pub struct RenderOutcome {
    pub success: bool,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

struct AudioAnalysis {
    duration_secs: f64,
    waveform: Vec<f32>,
}

pub async fn render_call_video(state: &AppState, call: &Call) -> RenderOutcome {
    // Observability only; the claim already moved the row to processing.
    if let Err(e) = state.store.set_video_status(call.id, VideoStatus::Processing).await {
        warn!(error=%e, call_id=%call.id, "could not stamp processing status");
    }

    let workdir = std::env::temp_dir();
    let audio_path = workdir.join(format!("santa-audio-{}.mp3", call.id));
    let main_path = workdir.join(format!("santa-video-{}.mp4", call.id));
    let final_path = workdir.join(format!("santa-final-{}.mp4", call.id));

    let result = render_inner(state, call, &audio_path, &main_path, &final_path).await;

    for path in [&audio_path, &main_path, &final_path] {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!(error=%e, path=%path.display(), "temp cleanup skipped");
        }
    }

    match result {
        Ok(video_url) => {
            info!(call_id=%call.id, video_url=%video_url, "video render completed");
            RenderOutcome {
                success: true,
                video_url: Some(video_url),
                error: None,
            }
        }
        Err(e) => {
            error!(error=%e, call_id=%call.id, "video render failed");
            if let Err(db_err) = state.store.set_video_status(call.id, VideoStatus::Failed).await {
                error!(error=%db_err, call_id=%call.id, "could not stamp failed status");
            }
            RenderOutcome {
                success: false,
                video_url: None,
                error: Some(e.to_string()),
            }
        }
    }
}

async fn render_inner(
    state: &AppState,
    call: &Call,
    audio_path: &Path,
    main_path: &Path,
    final_path: &Path,
) -> Result<String, AppError> {
    let object_path = format!("{}.mp3", call.id);
    let download_url = state.storage.signed_url(RECORDINGS_BUCKET, &object_path).await?;
    download_to_file(&state.http_client, &download_url, audio_path).await?;

    let analysis = match analyze_audio(audio_path).await {
        Ok(analysis) => analysis,
        Err(e) => {
            // Degrade rather than fail: render a fixed-length video with a
            // synthetic waveform.
            warn!(error=%e, call_id=%call.id, "audio analysis failed, using fallback");
            AudioAnalysis {
                duration_secs: FALLBACK_DURATION_SECS,
                waveform: Vec::new(),
            }
        }
    };
    debug!(
        call_id=%call.id,
        duration = analysis.duration_secs,
        waveform_points = analysis.waveform.len(),
        "audio analyzed"
    );

    let args = main_render_args(
        audio_path,
        main_path,
        analysis.duration_secs,
        &analysis.waveform,
        &call.child_name,
    );
    run_ffmpeg("ffmpeg", &args).await?;

    let render_path = match &state.outro_video_path {
        Some(outro) if tokio::fs::try_exists(outro).await.unwrap_or(false) => {
            match append_outro(main_path, outro, final_path).await {
                Ok(()) => final_path,
                Err(e) => {
                    // The branded outro is optional polish; ship the main cut.
                    warn!(error=%e, call_id=%call.id, "outro concat failed, using main video");
                    main_path
                }
            }
        }
        _ => main_path,
    };

    let video_bytes = tokio::fs::read(render_path).await.map_err(|e| {
        AppError::Render(format!("could not read rendered video: {e}"))
    })?;
    let video_object = format!("{}.mp4", call.id);
    state
        .storage
        .upload(VIDEOS_BUCKET, &video_object, video_bytes, "video/mp4")
        .await?;
    let video_url = state.storage.public_url(VIDEOS_BUCKET, &video_object);
    state.store.set_video_completed(call.id, &video_url).await?;
    state
        .store
        .log_event(
            call.id,
            CallEventType::VideoRenderCompleted,
            json!({ "video_url": video_url }),
        )
        .await;

    send_post_call_email_once(state, call, &video_url).await;

    Ok(video_url)
}

/// Exactly one post-call email per booking, keyed on `transcript_sent_at`.
async fn send_post_call_email_once(state: &AppState, call: &Call, video_url: &str) {
    // Re-read the row: the transcription webhook may have landed since the
    // render was claimed, and the email should carry the transcript.
    let fresh = match state.store.get_call(call.id).await {
        Ok(Some(fresh)) => fresh,
        Ok(None) => return,
        Err(e) => {
            warn!(error=%e, call_id=%call.id, "could not reload call for post-call email");
            return;
        }
    };
    if fresh.transcript_sent_at.is_some() {
        return;
    }

    match state.email.send_post_call(&fresh, video_url).await {
        Ok(email_id) => {
            if let Err(e) = state.store.stamp_transcript_sent(call.id).await {
                warn!(error=%e, call_id=%call.id, "could not stamp post-call email");
            }
            state
                .store
                .log_event(
                    call.id,
                    CallEventType::PostCallEmailSent,
                    json!({ "email_id": email_id }),
                )
                .await;
        }
        Err(e) => warn!(error=%e, call_id=%call.id, "post-call email failed"),
    }
}

async fn download_to_file(
    http: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<(), AppError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::Render(format!("recording download failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(AppError::Render(format!(
            "recording download failed: {}",
            resp.status()
        )));
    }

    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::Render(format!("could not create temp file: {e}")))?;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::Render(format!("download interrupted: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Render(format!("could not write temp file: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| AppError::Render(format!("could not flush temp file: {e}")))?;
    Ok(())
}

/// Duration via ffprobe, amplitude envelope via a mono PCM decode.
async fn analyze_audio(audio_path: &Path) -> Result<AudioAnalysis, AppError> {
    let probe = run_ffmpeg(
        "ffprobe",
        &[
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            audio_path.display().to_string(),
        ],
    )
    .await?;
    let duration_secs: f64 = String::from_utf8_lossy(&probe)
        .trim()
        .parse()
        .map_err(|_| AppError::Render("unparseable ffprobe duration".to_string()))?;
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(AppError::Render(format!(
            "implausible audio duration: {duration_secs}"
        )));
    }

    let pcm = run_ffmpeg(
        "ffmpeg",
        &[
            "-i".to_string(),
            audio_path.display().to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            ANALYSIS_SAMPLE_RATE.to_string(),
            "pipe:1".to_string(),
        ],
    )
    .await?;
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let waveform = waveform_from_samples(&samples, ANALYSIS_SAMPLE_RATE, WAVEFORM_POINTS_PER_SEC);

    Ok(AudioAnalysis {
        duration_secs,
        waveform,
    })
}

/// RMS per fixed-width bucket, normalized so the loudest bucket is 1.0.
fn waveform_from_samples(samples: &[i16], sample_rate: u32, points_per_sec: u32) -> Vec<f32> {
    let bucket_size = (sample_rate / points_per_sec).max(1) as usize;
    let mut points: Vec<f32> = samples
        .chunks(bucket_size)
        .map(|bucket| {
            let sum_sq: f64 = bucket
                .iter()
                .map(|&s| {
                    let v = s as f64 / i16::MAX as f64;
                    v * v
                })
                .sum();
            (sum_sq / bucket.len() as f64).sqrt() as f32
        })
        .collect();

    let peak = points.iter().cloned().fold(0.0f32, f32::max);
    if peak > 0.0 {
        for p in points.iter_mut() {
            *p /= peak;
        }
    }
    points
}

/// Boost quiet phone audio so the waveform visual fills its band.  Bounded so
/// near-silent recordings do not amplify into noise.
fn visual_gain(waveform: &[f32]) -> f64 {
    if waveform.is_empty() {
        return 1.0;
    }
    let mean = waveform.iter().map(|&p| p as f64).sum::<f64>() / waveform.len() as f64;
    if mean <= f64::EPSILON {
        return 4.0;
    }
    (0.5 / mean).clamp(1.0, 4.0)
}

fn frame_count(audio_duration_secs: f64) -> u32 {
    ((INTRO_SECS + audio_duration_secs) * FPS as f64).ceil() as u32
}

/// Full argument list for the main render.  A dark background with a title
/// card and an audio-driven waveform band; when no waveform data survived
/// analysis, a synthetic tone drives the animation instead so the video never
/// shows a dead flat line.
fn main_render_args(
    audio_path: &Path,
    out_path: &Path,
    audio_duration_secs: f64,
    waveform: &[f32],
    child_name: &str,
) -> Vec<String> {
    let total_secs = INTRO_SECS + audio_duration_secs;
    let frames = frame_count(audio_duration_secs);
    // Filter-graph text is single-quoted; strip characters that would break
    // the quoting.
    let title = format!(
        "A Call From Santa for {}",
        child_name.replace(['\'', ':', ';', '[', ']', ','], "")
    );

    let wave_source = if waveform.is_empty() {
        format!(
            "aevalsrc=sin(440*2*PI*t)*0.4*(0.6+0.4*sin(2*PI*t/3)):s={ANALYSIS_SAMPLE_RATE}:d={audio_duration_secs:.3}[wavesrc]"
        )
    } else {
        format!("[1:a]volume={:.3}[wavesrc]", visual_gain(waveform))
    };
    let filter = format!(
        "{wave_source};\
         [wavesrc]showwaves=s=1280x240:mode=cline:rate={FPS}:colors=0xF8B229[wave];\
         [0:v][wave]overlay=x=0:y=420[withwave];\
         [withwave]drawtext=text='{title}':fontcolor=white:fontsize=64:x=(w-text_w)/2:y=140[outv];\
         [1:a]adelay={intro_ms}|{intro_ms}[outa]",
        intro_ms = (INTRO_SECS * 1000.0) as u32,
    );

    vec![
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!("color=c=0x0B1D3A:s=1280x720:r={FPS}:d={total_secs:.3}"),
        "-i".to_string(),
        audio_path.display().to_string(),
        "-filter_complex".to_string(),
        filter,
        "-map".to_string(),
        "[outv]".to_string(),
        "-map".to_string(),
        "[outa]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-crf".to_string(),
        "18".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-r".to_string(),
        FPS.to_string(),
        "-frames:v".to_string(),
        frames.to_string(),
        "-y".to_string(),
        out_path.display().to_string(),
    ]
}

fn concat_args(main_path: &Path, outro_path: &Path, out_path: &Path) -> Vec<String> {
    vec![
        "-i".to_string(),
        main_path.display().to_string(),
        "-i".to_string(),
        outro_path.display().to_string(),
        "-filter_complex".to_string(),
        "[0:v:0][0:a:0][1:v:0][1:a:0]concat=n=2:v=1:a=1[outv][outa]".to_string(),
        "-map".to_string(),
        "[outv]".to_string(),
        "-map".to_string(),
        "[outa]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-y".to_string(),
        out_path.display().to_string(),
    ]
}

async fn append_outro(
    main_path: &Path,
    outro_path: &Path,
    out_path: &Path,
) -> Result<(), AppError> {
    let args = concat_args(main_path, outro_path, out_path);
    run_ffmpeg("ffmpeg", &args).await?;
    Ok(())
}

/// Run an ffmpeg-family binary with a hard wall-clock bound.  Returns stdout;
/// a non-zero exit surfaces the stderr tail.
async fn run_ffmpeg(binary: &str, args: &[String]) -> Result<Vec<u8>, AppError> {
    let child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AppError::Render(format!("could not spawn {binary}: {e}")))?;

    let output = tokio::time::timeout(FFMPEG_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| AppError::Render(format!("{binary} timed out")))?
        .map_err(|e| AppError::Render(format!("{binary} failed to run: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        return Err(AppError::Render(format!(
            "{binary} exited with {}: {tail}",
            output.status
        )));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_bucketing_counts_points() {
        // Three seconds of audio at the analysis rate.
        let samples = vec![1000i16; (ANALYSIS_SAMPLE_RATE * 3) as usize];
        let points = waveform_from_samples(&samples, ANALYSIS_SAMPLE_RATE, WAVEFORM_POINTS_PER_SEC);
        assert_eq!(points.len(), 300);
    }

    #[test]
    fn waveform_normalizes_to_unit_peak() {
        let mut samples = vec![100i16; 160];
        samples.extend(vec![10_000i16; 80]);
        let points = waveform_from_samples(&samples, ANALYSIS_SAMPLE_RATE, WAVEFORM_POINTS_PER_SEC);
        let peak = points.iter().cloned().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-6);
        assert!(points[0] < points[2]);
    }

    #[test]
    fn silence_yields_zero_waveform() {
        let samples = vec![0i16; 800];
        let points = waveform_from_samples(&samples, ANALYSIS_SAMPLE_RATE, WAVEFORM_POINTS_PER_SEC);
        assert!(points.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn visual_gain_bounds() {
        assert_eq!(visual_gain(&[]), 1.0);
        // Loud audio is never attenuated below unity.
        assert_eq!(visual_gain(&[0.9, 0.8, 1.0]), 1.0);
        // Quiet audio is boosted, capped at 4x.
        assert_eq!(visual_gain(&[0.01, 0.02]), 4.0);
        let mid = visual_gain(&[0.25, 0.25]);
        assert!(mid > 1.0 && mid < 4.0);
    }

    #[test]
    fn frame_count_includes_intro() {
        assert_eq!(frame_count(30.0), 1920);
        assert_eq!(frame_count(0.5), 150);
    }

    #[test]
    fn main_render_uses_synthetic_waveform_when_analysis_is_empty() {
        let args = main_render_args(
            Path::new("/tmp/in.mp3"),
            Path::new("/tmp/out.mp4"),
            30.0,
            &[],
            "Emma",
        );
        let filter = args
            .iter()
            .position(|a| a == "-filter_complex")
            .map(|i| &args[i + 1])
            .unwrap();
        assert!(filter.contains("aevalsrc"));
        assert!(filter.contains("showwaves"));
        assert!(args.contains(&"18".to_string()));
        assert!(args.contains(&"yuv420p".to_string()));
        assert!(args.contains(&frame_count(30.0).to_string()));
    }

    #[test]
    fn main_render_drives_waveform_from_audio_when_present() {
        let args = main_render_args(
            Path::new("/tmp/in.mp3"),
            Path::new("/tmp/out.mp4"),
            12.0,
            &[0.2, 0.4, 0.3],
            "Noah",
        );
        let filter = args
            .iter()
            .position(|a| a == "-filter_complex")
            .map(|i| &args[i + 1])
            .unwrap();
        assert!(filter.contains("[1:a]volume="));
        assert!(!filter.contains("aevalsrc"));
    }

    #[test]
    fn concat_re_encodes_both_streams() {
        let args = concat_args(
            Path::new("/tmp/main.mp4"),
            Path::new("/tmp/outro.mov"),
            Path::new("/tmp/final.mp4"),
        );
        assert!(args.contains(&"[0:v:0][0:a:0][1:v:0][1:a:0]concat=n=2:v=1:a=1[outv][outa]".to_string()));
        assert!(args.contains(&"23".to_string()));
        assert!(args.contains(&"libx264".to_string()));
    }
}
