//! SafeBeacon: wearable LoRa panic button
//!
//! Press once to open a three-second confirmation window, press again
//! inside it to cancel. If the window runs out, an emergency packet goes
//! out over LoRa to the receiver gateway.
//!
//! Three execution contexts share state only through [`Signals`]:
//! - the button task (edge detection and debounce)
//! - the confirmation timer task
//! - the main task, which owns the radio and LED and runs the polling loop

#![no_std]
#![no_main]

#[cfg(not(any(feature = "board-devkit", feature = "board-lora32")))]
compile_error!("select a board: --features devkit or --features lora32");

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::delay::Delay;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::spi::Mode;
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;

use safebeacon::battery::AdcBattery;
use safebeacon::config::{BeaconConfig, RadioConfig};
use safebeacon::hal::{Clock, DelayTimer};
use safebeacon::protocol::{DeviceMessage, VERSION};
use safebeacon::radio::Sx127x;
use safebeacon::session::{Beacon, BeaconParts};
use safebeacon::signal::Signals;
use safebeacon::{board, comm};

const CONFIG: BeaconConfig = BeaconConfig::new();

/// LoRa SPI clock
const LORA_SPI_FREQ_MHZ: u32 = 8;

// ── Shared state ─────────────────────────────────────────────────────

/// Press mailbox, debounce guard and protocol state
static SIGNALS: Signals = Signals::new(CONFIG.debounce_ms);

#[derive(Clone, Copy)]
enum TimerCommand {
    Start(u32),
    Cancel,
}

/// Commands from the polling loop to the confirmation timer task. Only
/// the latest command matters, so a single-slot signal is enough.
static TIMER_COMMANDS: Signal<CriticalSectionRawMutex, TimerCommand> = Signal::new();

// ── Collaborators ────────────────────────────────────────────────────

struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

/// One-shot timer backed by [`confirm_timer_task`].
struct SignalTimer;

impl DelayTimer for SignalTimer {
    fn start_once(&mut self, duration_ms: u32) {
        TIMER_COMMANDS.signal(TimerCommand::Start(duration_ms));
    }

    fn cancel(&mut self) {
        TIMER_COMMANDS.signal(TimerCommand::Cancel);
    }
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Confirmation timer. Races the armed deadline against the next command;
/// on expiry only flips `Delay -> Confirmed`, the polling loop does the rest.
#[embassy_executor::task]
async fn confirm_timer_task() {
    let mut armed: Option<u32> = None;

    loop {
        let cmd = match armed.take() {
            None => TIMER_COMMANDS.wait().await,
            Some(ms) => {
                match select(
                    TIMER_COMMANDS.wait(),
                    Timer::after(Duration::from_millis(ms as u64)),
                )
                .await
                {
                    Either::First(cmd) => cmd,
                    Either::Second(()) => {
                        if SIGNALS.expire_delay() {
                            log::info!("Confirmation window elapsed");
                        } else {
                            log::debug!("Stale confirmation expiry discarded");
                        }
                        continue;
                    }
                }
            }
        };

        armed = match cmd {
            TimerCommand::Start(ms) => Some(ms),
            TimerCommand::Cancel => None,
        };
    }
}

/// Button edge task. Debounces and posts presses; never blocks on anything
/// but the next edge.
#[embassy_executor::task]
async fn button_task(mut button: Input<'static>) {
    loop {
        button.wait_for_falling_edge().await;
        let now = Instant::now().as_millis() as u32;
        if !SIGNALS.on_press_edge(now) {
            log::trace!("Bounce suppressed at {} ms", now);
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Start the RTOS (needs a timer and a software interrupt)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!(
        "SafeBeacon v{} starting on {} (serial {} baud)",
        VERSION,
        board::BOARD_NAME,
        comm::SERIAL_BAUD
    );
    comm::emit(&DeviceMessage::Boot {
        device: CONFIG.device_id,
        board: board::BOARD_NAME,
        version: VERSION,
    });

    // Board wiring: SPI bus and DIO0 are shared by both boards
    #[cfg(feature = "board-lora32")]
    let (led_pin, rst_pin, battery_pin) =
        (peripherals.GPIO25, peripherals.GPIO23, peripherals.GPIO35);
    #[cfg(not(feature = "board-lora32"))]
    let (led_pin, rst_pin, battery_pin) =
        (peripherals.GPIO2, peripherals.GPIO14, peripherals.GPIO34);

    let button = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );
    let led = Output::new(led_pin, Level::Low, OutputConfig::default());

    // ── LoRa transceiver ─────────────────────────────────────────────

    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_mhz(LORA_SPI_FREQ_MHZ))
        .with_mode(Mode::_0);
    let spi = Spi::new(peripherals.SPI2, spi_config)
        .expect("SPI config rejected")
        .with_sck(peripherals.GPIO5)
        .with_miso(peripherals.GPIO19)
        .with_mosi(peripherals.GPIO27);

    let cs = Output::new(peripherals.GPIO18, Level::High, OutputConfig::default());
    let spi_device = ExclusiveDevice::new_no_delay(spi, cs).expect("CS pin setup failed");
    let reset = Output::new(rst_pin, Level::High, OutputConfig::default());
    let radio = Sx127x::new(spi_device, reset, Delay::new(), RadioConfig::new());

    // ── Battery sense ────────────────────────────────────────────────

    let mut adc_config = AdcConfig::new();
    let mut battery_adc_pin = adc_config.enable_pin(battery_pin, Attenuation::_11dB);
    let mut adc = Adc::new(peripherals.ADC1, adc_config);
    let battery = AdcBattery::new(
        move || adc.read_blocking(&mut battery_adc_pin),
        board::ADC_REFERENCE_MV,
        board::BATTERY_DIVIDER,
    );

    // ── Session ──────────────────────────────────────────────────────

    let mut beacon = Beacon::new(
        &SIGNALS,
        CONFIG,
        BeaconParts {
            radio,
            timer: SignalTimer,
            clock: EmbassyClock,
            battery,
            led,
            delay: Delay::new(),
        },
    );

    if let Err(e) = beacon.boot() {
        log::error!("Boot failed: {}", e);
        beacon.fail_stop();
    }

    // Input is only accepted once the radio is known good
    spawner.spawn(confirm_timer_task()).unwrap();
    spawner.spawn(button_task(button)).unwrap();

    log::info!("System ready, button on GPIO{}", board::BUTTON_PIN);

    loop {
        beacon.poll();
        Timer::after(Duration::from_millis(CONFIG.poll_interval_ms as u64)).await;
    }
}
