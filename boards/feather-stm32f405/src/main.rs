#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod adc;
mod ccmram;
mod device_id;
mod eth;
mod network;
mod ramdisk;
mod stats;
mod time;

stm32_tim2_monotonic!(Mono, 1_000_000);

/// RAM volume driver over the CCM arena
static RAM_DISK: ramdisk::RamDisk = ramdisk::RamDisk::new();

/// Handoff transmit buffers of the publisher
static TX_POOL: network::TxPool = network::TxPool::new();

/// Node configuration as deployed on this board
///
/// The publisher uses the handoff discipline with Celsius payloads.
fn node_config() -> node_core::NodeConfig {
    use node_core::{NodeConfig, PublisherConfig, TransmitDiscipline};

    NodeConfig {
        publisher: PublisherConfig::for_discipline(TransmitDiscipline::Handoff),
        ..NodeConfig::default()
    }
}

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use defmt::info;
    use embassy_futures::join::{join3, join5};
    use embassy_stm32::adc::Adc;
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Level, Output, Pull, Speed};
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rtc::{Rtc, RtcConfig};
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::mutex::Mutex;
    use embassy_time::Delay;
    use hal_abstractions::{LogTaskSpawner, PriorityControl, RamDiskArena, SpawnError};
    use node_core::{
        BootOrchestrator, Heartbeat, NetworkActivationGate, SensorSampler, ServiceWorkLoop,
        SharedSensor, StaticContent, TelemetryLogger, TelemetryPublisher,
    };
    use static_cell::StaticCell;

    use adc::BoardAdc;
    use network::launch::{SERVER_START, TIME_SYNC_START};
    use network::{console, manager, NetStack, NetworkConfig, NodeServerHost, SignalLauncher, SntpClient};
    use ramdisk::{RamStorage, RamVolume};
    use time::RtcClock;

    /// The single ADC, shared by the logger and the publisher
    type SharedSampler = Mutex<CriticalSectionRawMutex, SensorSampler<BoardAdc, RtcClock>>;

    type SpiPeripheral = embassy_stm32::Peri<'static, peripherals::SPI2>;
    type PinPB13 = embassy_stm32::Peri<'static, peripherals::PB13>;
    type PinPB15 = embassy_stm32::Peri<'static, peripherals::PB15>;
    type PinPB14 = embassy_stm32::Peri<'static, peripherals::PB14>;
    type PinPC6 = embassy_stm32::Peri<'static, peripherals::PC6>;
    type PinPC3 = embassy_stm32::Peri<'static, peripherals::PC3>;
    type PinPC2 = embassy_stm32::Peri<'static, peripherals::PC2>;
    type ExtiChannel = embassy_stm32::Peri<'static, peripherals::EXTI2>;
    type DmaTx = embassy_stm32::Peri<'static, peripherals::DMA1_CH4>;
    type DmaRx = embassy_stm32::Peri<'static, peripherals::DMA1_CH3>;

    struct NetworkPeripherals {
        spi: SpiPeripheral,
        sck: PinPB13,
        mosi: PinPB15,
        miso: PinPB14,
        cs: PinPC6,
        reset: PinPC3,
        int: PinPC2,
        exti: ExtiChannel,
        dma_tx: DmaTx,
        dma_rx: DmaRx,
    }

    /// Starts the logger as its own RTIC task
    struct RticLogSpawner;

    impl LogTaskSpawner<RamVolume> for RticLogSpawner {
        fn spawn_logger(&mut self, volume: RamVolume) -> Result<(), SpawnError> {
            logger_task::spawn(volume).map_err(|_| SpawnError::AlreadyRunning)
        }
    }

    /// Hands the rest of boot over to the priority 1 heartbeat task
    ///
    /// RTIC priorities are fixed per task, so `boot` cannot lower its own;
    /// it returns once bring-up is done and the heartbeat carries on at the
    /// lowest software priority.
    struct IdleHandover;

    impl PriorityControl for IdleHandover {
        fn lower_to_idle(&mut self) {
            if heartbeat::spawn().is_err() {
                defmt::error!("heartbeat already running");
            }
        }
    }

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        led: Output<'static>,
        logger_sensor: &'static SharedSampler,
        publisher_sensor: &'static SharedSampler,
    }

    #[init]
    fn init(_cx: init::Context) -> (Shared, Local) {
        info!("NTC sensor node starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // HSE (12 MHz) / PREDIV(6) = 2 MHz (PLL input)
        // 2 MHz * MUL(168) = 336 MHz (VCO)
        // VCO / DIVP(4) = 84 MHz (SYSCLK)
        // VCO / DIVQ(7) = 48 MHz
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: Some(embassy_stm32::rcc::PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        config.rcc.ls = LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz(32_768),
                mode: LseMode::Oscillator(embassy_stm32::rcc::LseDrive::MediumHigh),
            }),
        };

        let p = embassy_stm32::init(config);
        ccmram::reset_flags();
        info!("Device UID: {}", device_id::uid_hex());

        // TIM2 on APB1: timer clock = 2*APB1 when prescaler != 1
        let timer_clock_hz = 84_000_000;
        Mono::start(timer_clock_hz);

        let rtc = Rtc::new(p.RTC, RtcConfig::default());
        time::initialize_rtc(rtc);

        static SENSOR: StaticCell<SharedSampler> = StaticCell::new();
        let board_adc = BoardAdc::new(Adc::new(p.ADC1), p.PA4, p.PA5);
        let sensor: &'static SharedSampler =
            SENSOR.init(Mutex::new(SensorSampler::new(board_adc, RtcClock)));

        let led = Output::new(p.PC1, Level::High, Speed::Low);

        let net_periph = NetworkPeripherals {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
        };

        boot::spawn().ok();
        network_task::spawn(net_periph).ok();

        (
            Shared {},
            Local {
                led,
                logger_sensor: sensor,
                publisher_sensor: sensor,
            },
        )
    }

    /// Bring up storage and the logger ahead of the priority 1 tasks
    #[task(priority = 2)]
    async fn boot(_cx: boot::Context) {
        let node = node_config();

        let Some(region) = ccmram::take_volume_region() else {
            defmt::panic!("volume arena already taken");
        };
        let arena = match RamDiskArena::new(region, ccmram::VOLUME_GEOMETRY) {
            Ok(arena) => arena,
            Err(e) => defmt::panic!("volume arena rejected: {}", e),
        };

        let orchestrator = BootOrchestrator::new(
            RamStorage::new(&RAM_DISK),
            StaticContent::default(),
            RticLogSpawner,
            IdleHandover,
        );
        if let Err(e) = orchestrator.bring_up(node.storage.volume_name, arena) {
            defmt::panic!("boot failed: {}", e);
        }
    }

    /// Blink forever at the lowest software priority
    #[task(priority = 1, local = [led])]
    async fn heartbeat(cx: heartbeat::Context) {
        let period_ms = node_config().heartbeat_period_ms;
        info!("boot done, heartbeat every {} ms", period_ms);
        Heartbeat::new(cx.local.led, Delay, period_ms).run().await
    }

    /// Append one NTC reading per period to the log file
    #[task(priority = 1, local = [logger_sensor])]
    async fn logger_task(cx: logger_task::Context, volume: RamVolume) {
        let node = node_config();
        let source = SharedSensor::new(*cx.local.logger_sensor, node.logger.channel);
        TelemetryLogger::new(
            volume,
            source,
            RtcClock,
            Delay,
            node.calibration,
            node.logger,
        )
        .run(stats::record_logger)
        .await
    }

    /// Network task: stack runners, publisher and the network services
    ///
    /// Stack is !Send and must remain within this task.
    #[task(priority = 1, local = [publisher_sensor])]
    async fn network_task(cx: network_task::Context, periph: NetworkPeripherals) {
        use embassy_net::{Config, StackResources};

        info!("Network task started");

        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(10_000_000); // 10 MHz for W5500

        let spi = Spi::new(
            periph.spi,
            periph.sck,
            periph.mosi,
            periph.miso,
            periph.dma_tx,
            periph.dma_rx,
            spi_config,
        );

        let cs = Output::new(periph.cs, Level::High, Speed::VeryHigh);
        let reset = Output::new(periph.reset, Level::High, Speed::Low);
        let int = ExtiInput::new(periph.int, periph.exti, Pull::Up);

        let eth_periph = eth::EthPeripherals {
            spi,
            cs,
            reset,
            int,
        };

        let net_config = NetworkConfig::for_this_device();
        let (device, w5500_runner) = match eth::init_w5500(eth_periph, net_config.mac_addr).await {
            Ok(pair) => pair,
            Err(e) => defmt::panic!("W5500 init failed: {}", e),
        };

        // DHCP, DNS, publisher, console, SNTP, HTTP
        static RESOURCES: StaticCell<StackResources<8>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            device,
            Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            net_config.seed,
        );
        info!("Network stack initialized with DHCP");

        let node = node_config();
        let volume = RamVolume::new(&RAM_DISK);
        let gate = NetworkActivationGate::new(node.console);
        let mut launcher = SignalLauncher;

        let publisher = async {
            let config = node.publisher.clone();
            let source = SharedSensor::new(*cx.local.publisher_sensor, config.channel);
            match TelemetryPublisher::start(
                NetStack::new(stack, &TX_POOL),
                source,
                Delay,
                node.calibration,
                config,
            ) {
                Ok(publisher) => publisher.run(stats::record_publisher).await,
                Err(e) => defmt::panic!("publisher start failed: {}", e),
            }
        };

        let server = async {
            SERVER_START.wait().await;
            match ServiceWorkLoop::start(NodeServerHost::new(stack, volume), &node.services) {
                Ok(work) => work.run().await,
                Err(e) => defmt::panic!("server work failed: {}", e),
            }
        };

        let sntp = async {
            TIME_SYNC_START.wait().await;
            SntpClient::default().run(stack).await
        };

        join5(
            w5500_runner.run(),
            net_runner.run(),
            publisher,
            manager::watch_link(stack, &gate, &mut launcher),
            join3(console::run(stack, volume), server, sntp),
        )
        .await;
    }

    /// RTIC idle task - WFI sleep mode when no tasks active
    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        info!("Idle task started - entering WFI loop");
        loop {
            cortex_m::asm::wfi();
        }
    }
}
