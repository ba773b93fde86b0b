use std::sync::{atomic::{AtomicU64, Ordering}, Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{AudioBackend, BackendError, DeviceInfo, DiagnosticEvent, DiagnosticsCb, RenderFn, CHANNELS, FRAMES_PER_CALLBACK, SAMPLE_RATE};

/// Worker-thread-backed CPAL backend. `CpalAudioBackend` is a Send-safe
/// handle that talks to the worker over a control channel; the worker owns
/// the CPAL `Stream` so no non-Send objects cross thread boundaries.
pub struct CpalAudioBackend {
    inner: Arc<CpalBackendInner>,
}

struct CpalBackendInner {
    info: DeviceInfo,
    render: Mutex<Option<RenderFn>>,
    frames: AtomicU64,
    ctrl_tx: Sender<CtrlMsg>,
}

enum CtrlMsg {
    SetRender(Option<RenderFn>),
    Start,
    Stop,
    SetDiagnostics(Option<DiagnosticsCb>),
    Shutdown,
}

impl CpalAudioBackend {
    pub fn new() -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(BackendError::DeviceNotFound)?;

        let config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Fixed(FRAMES_PER_CALLBACK as u32),
        };

        let info = DeviceInfo {
            sample_rate: SAMPLE_RATE,
            buffer_size: FRAMES_PER_CALLBACK,
            channels: CHANNELS,
            device_name: device.name().ok(),
        };

        let (tx, rx) = unbounded::<CtrlMsg>();
        let inner = Arc::new(CpalBackendInner { info, render: Mutex::new(None), frames: AtomicU64::new(0), ctrl_tx: tx });

        let inner_worker = inner.clone();
        thread::spawn(move || worker_loop(device, config, rx, inner_worker));

        Ok(Self { inner })
    }
}

fn worker_loop(device: cpal::Device, config: StreamConfig, rx: Receiver<CtrlMsg>, inner: Arc<CpalBackendInner>) {
    let channels = config.channels as usize;
    let mut diagnostics: Option<DiagnosticsCb> = None;
    let mut stream_opt: Option<cpal::Stream> = None;

    loop {
        while let Ok(msg) = rx.try_recv() {
            match msg {
                CtrlMsg::SetRender(opt) => {
                    *inner.render.lock().unwrap() = opt;
                }
                CtrlMsg::Start => {
                    if stream_opt.is_none() {
                        let inner_for_cb = inner.clone();
                        let diagnostics_for_err_cb = diagnostics.clone();
                        let err_cb = move |err| {
                            tracing::error!(%err, "CPAL stream error");
                            if let Some(cb) = &diagnostics_for_err_cb {
                                let cb_clone = cb.clone();
                                thread::spawn(move || cb_clone(DiagnosticEvent::XRun { count: 1 }));
                            }
                        };

                        let data_cb = move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                            let render = inner_for_cb.render.lock().unwrap().clone();
                            if let Some(render) = render {
                                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| render(data)));
                                if result.is_err() {
                                    data.iter_mut().for_each(|s| *s = 0);
                                }
                            } else {
                                data.iter_mut().for_each(|s| *s = 0);
                            }
                            inner_for_cb.frames.fetch_add((data.len() / channels) as u64, Ordering::Relaxed);
                        };

                        match device.build_output_stream(&config, data_cb, err_cb, None) {
                            Ok(stream) => {
                                if let Err(e) = stream.play() {
                                    tracing::error!(%e, "failed to start CPAL stream");
                                } else {
                                    stream_opt = Some(stream);
                                }
                            }
                            Err(e) => {
                                tracing::error!(%e, "failed to build CPAL stream");
                                if let Some(cb) = &diagnostics {
                                    let cb_clone = cb.clone();
                                    thread::spawn(move || cb_clone(DiagnosticEvent::Other(format!("stream build failed: {e}"))));
                                }
                            }
                        }
                    }
                }
                CtrlMsg::Stop => stream_opt = None,
                CtrlMsg::SetDiagnostics(cb) => diagnostics = cb,
                CtrlMsg::Shutdown => return,
            }
        }
        thread::sleep(Duration::from_millis(2));
    }
}

impl AudioBackend for CpalAudioBackend {
    fn start(&mut self, render: RenderFn) -> Result<(), BackendError> {
        self.inner.ctrl_tx.send(CtrlMsg::SetRender(Some(render))).map_err(|_| BackendError::Other("worker channel closed".into()))?;
        self.inner.ctrl_tx.send(CtrlMsg::Start).map_err(|_| BackendError::Other("worker channel closed".into()))?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.inner.ctrl_tx.send(CtrlMsg::Stop).map_err(|_| BackendError::Other("worker channel closed".into()))?;
        self.inner.ctrl_tx.send(CtrlMsg::SetRender(None)).map_err(|_| BackendError::Other("worker channel closed".into()))?;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.inner.info.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.inner.info.buffer_size
    }

    fn channels(&self) -> u16 {
        self.inner.info.channels
    }

    fn frames_since_start(&self) -> u64 {
        self.inner.frames.load(Ordering::Relaxed)
    }

    fn set_diagnostics_callback(&mut self, cb: Option<DiagnosticsCb>) {
        self.inner.ctrl_tx.send(CtrlMsg::SetDiagnostics(cb)).ok();
    }

    fn as_device_info_provider(&self) -> Option<&dyn crate::DeviceInfoProvider> {
        None
    }
}

impl Drop for CpalAudioBackend {
    fn drop(&mut self) {
        self.inner.ctrl_tx.send(CtrlMsg::Shutdown).ok();
    }
}
