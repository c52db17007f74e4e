use crate::config::DashboardSettings;
use crate::data::Snapshot;
use crate::poll::Collector;
use crate::render::{self, MemoryKind, HEADERS};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use egui::Color32;
use egui_plot::{Bar, BarChart, Legend, Plot};
use std::time::{Duration, Instant};
use std::thread;

const UTILIZATION_COLOR: Color32 = Color32::RED;
const MEMORY_USED_COLOR: Color32 = Color32::from_rgb(0x1F, 0x77, 0xB4);
const MEMORY_TOTAL_COLOR: Color32 = Color32::from_rgb(0xDD, 0xDD, 0xDD);

// Messages from the UI to the collector thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    RefreshNow,
    SetInterval(Duration),
}

/// Runs `poll_once` on a background thread, one cycle at a time.
///
/// A new cycle starts when `interval` elapses or `Control::RefreshNow`
/// arrives. The thread stops once either channel's other end is dropped.
pub fn spawn_collector(
    collector: Collector,
    interval: Duration,
) -> (Sender<Control>, Receiver<Snapshot>) {
    let (snapshot_tx, snapshot_rx) = bounded(4);
    let (control_tx, control_rx) = bounded::<Control>(16);

    thread::spawn(move || {
        let mut interval = interval;
        'cycle: loop {
            if snapshot_tx.send(collector.poll_once()).is_err() {
                break;
            }
            loop {
                match control_rx.recv_timeout(interval) {
                    Ok(Control::RefreshNow) | Err(RecvTimeoutError::Timeout) => continue 'cycle,
                    Ok(Control::SetInterval(next)) => interval = next,
                    Err(RecvTimeoutError::Disconnected) => break 'cycle,
                }
            }
        }
        tracing::debug!("collector thread stopped");
    });

    (control_tx, snapshot_rx)
}

// Application state
pub struct DashboardApp {
    receiver: Receiver<Snapshot>,
    control: Sender<Control>,
    snapshot: Option<Snapshot>,
    last_update: Option<Instant>,
    settings: DashboardSettings,
}

impl DashboardApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        collector: Collector,
        defaults: DashboardSettings,
    ) -> Self {
        let settings = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, DashboardSettings::KEY))
            .unwrap_or(defaults);

        let (control, receiver) = spawn_collector(collector, settings.refresh_interval());

        let mut style = (*cc.egui_ctx.style()).clone();
        style.visuals.dark_mode = true;
        cc.egui_ctx.set_style(style);

        Self {
            receiver,
            control,
            snapshot: None,
            last_update: None,
            settings,
        }
    }

    fn send(&self, message: Control) {
        if self.control.try_send(message).is_err() {
            tracing::warn!("collector thread is not accepting {message:?}");
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("🔄 Refresh now").clicked() {
                self.send(Control::RefreshNow);
            }
            let slider = egui::Slider::new(
                &mut self.settings.refresh_secs,
                DashboardSettings::MIN_REFRESH_SECS..=DashboardSettings::MAX_REFRESH_SECS,
            )
            .text("Refresh (s)");
            if ui.add(slider).changed() {
                self.send(Control::SetInterval(self.settings.refresh_interval()));
            }
            ui.checkbox(&mut self.settings.show_charts, "Charts");
            if let Some(at) = self.last_update {
                ui.label(format!("Updated {}s ago", at.elapsed().as_secs()));
            }
        });
    }

    fn table(ui: &mut egui::Ui, snapshot: &Snapshot) {
        egui::Grid::new("devices_grid")
            .striped(true)
            .spacing([16.0, 6.0])
            .show(ui, |ui| {
                for header in HEADERS {
                    ui.label(egui::RichText::new(header).strong());
                }
                ui.end_row();
                for row in render::table_rows(&snapshot.records) {
                    for cell in row.cells() {
                        ui.label(cell);
                    }
                    ui.end_row();
                }
            });
    }

    fn charts(ui: &mut egui::Ui, snapshot: &Snapshot) {
        let labels: Vec<String> = snapshot.records.iter().map(|r| r.label()).collect();

        ui.heading("📊 GPU Utilization");
        let bars = render::utilization_chart(&snapshot.records)
            .into_iter()
            .map(|b| Bar::new(b.position as f64, b.percent).name(b.label).width(0.5))
            .collect();
        let chart = BarChart::new("Utilization (%)", bars).color(UTILIZATION_COLOR);
        device_plot("utilization_plot", labels.clone())
            .include_y(100.0)
            .show(ui, |plot_ui| plot_ui.bar_chart(chart));

        ui.add_space(12.0);
        ui.heading("💾 Memory Usage");
        let memory = render::memory_chart(&snapshot.records);
        let series = |kind: MemoryKind, offset: f64| {
            memory
                .iter()
                .filter(|b| b.kind == kind)
                .map(|b| {
                    Bar::new(b.position as f64 + offset, b.megabytes)
                        .name(&b.label)
                        .width(0.35)
                })
                .collect::<Vec<_>>()
        };
        let used = BarChart::new(MemoryKind::Used.legend(), series(MemoryKind::Used, -0.18))
            .color(MEMORY_USED_COLOR);
        let total = BarChart::new(MemoryKind::Total.legend(), series(MemoryKind::Total, 0.18))
            .color(MEMORY_TOTAL_COLOR);
        device_plot("memory_plot", labels)
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                plot_ui.bar_chart(total);
                plot_ui.bar_chart(used);
            });
    }
}

fn device_plot(id: &str, labels: Vec<String>) -> Plot<'static> {
    Plot::new(id)
        .height(300.0)
        .include_y(0.0)
        .allow_scroll(false)
        .allow_drag(false)
        .x_axis_formatter(move |mark, _range| {
            let slot = mark.value.round();
            if (mark.value - slot).abs() > f64::EPSILON || slot < 0.0 {
                return String::new();
            }
            labels.get(slot as usize).cloned().unwrap_or_default()
        })
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(snapshot) = self.receiver.try_recv() {
            self.snapshot = Some(snapshot);
            self.last_update = Some(Instant::now());
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("🚀 GPU Usage Dashboard");
            ui.add_space(8.0);
            self.controls(ui);
            ui.separator();

            let Some(snapshot) = &self.snapshot else {
                ui.label("Collecting…");
                return;
            };

            if !snapshot.available {
                ui.colored_label(
                    Color32::from_rgb(255, 128, 0),
                    "GPU telemetry is unavailable; no devices to show.",
                );
            }

            egui::ScrollArea::vertical().show(ui, |ui| {
                Self::table(ui, snapshot);
                if self.settings.show_charts && !snapshot.records.is_empty() {
                    ui.add_space(12.0);
                    ui.separator();
                    Self::charts(ui, snapshot);
                }
            });
        });

        ctx.request_repaint_after(Duration::from_millis(500));
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, DashboardSettings::KEY, &self.settings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::{LookupError, ProcessTable};
    use crate::data::{DeviceHandle, DeviceSample, ProcessEntry};
    use crate::query::{DeviceQuery, QueryError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingQuery(Arc<AtomicUsize>);

    impl DeviceQuery for CountingQuery {
        fn list_devices(&self) -> Result<Vec<DeviceSample>, QueryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        fn list_device_handles(&self) -> Result<Vec<(u32, DeviceHandle)>, QueryError> {
            Ok(Vec::new())
        }

        fn list_compute_processes(&self) -> Result<Vec<ProcessEntry>, QueryError> {
            Ok(Vec::new())
        }
    }

    struct NoProcesses;

    impl ProcessTable for NoProcesses {
        fn owner(&self, pid: u32) -> Result<String, LookupError> {
            Err(LookupError::Exited(pid))
        }

        fn start_time(&self, pid: u32) -> Result<String, LookupError> {
            Err(LookupError::Exited(pid))
        }
    }

    #[test]
    fn refresh_now_triggers_another_cycle() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let collector = Collector::new(
            Box::new(CountingQuery(Arc::clone(&cycles))),
            Box::new(NoProcesses),
        );
        let (control, snapshots) = spawn_collector(collector, Duration::from_secs(3600));

        let first = snapshots.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.available);
        control.send(Control::RefreshNow).unwrap();
        snapshots.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(cycles.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn interval_change_takes_effect() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let collector = Collector::new(
            Box::new(CountingQuery(Arc::clone(&cycles))),
            Box::new(NoProcesses),
        );
        let (control, snapshots) = spawn_collector(collector, Duration::from_secs(3600));
        snapshots.recv_timeout(Duration::from_secs(5)).unwrap();

        control
            .send(Control::SetInterval(Duration::from_millis(20)))
            .unwrap();
        snapshots.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(cycles.load(Ordering::SeqCst) >= 2);
    }
}
