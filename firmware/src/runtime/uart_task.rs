use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use super::UART_BAUD;
use crate::link::{RX_QUEUE_DEPTH, TX_QUEUE_DEPTH, UartQueues};
use crate::status;

static UART_TX_BUFFER: StaticCell<[u8; TX_QUEUE_DEPTH]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; RX_QUEUE_DEPTH]> = StaticCell::new();

/// Longest burst pulled from the transmit queue per UART write.
const TX_BURST: usize = 16;

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART3>;
});

#[embassy_executor::task]
pub async fn run(
    queues: &'static UartQueues,
    usart: Peri<'static, hal::peripherals::USART3>,
    tx_pin: Peri<'static, hal::peripherals::PB10>,
    rx_pin: Peri<'static, hal::peripherals::PB11>,
    rts_pin: Peri<'static, hal::peripherals::PB14>,
    cts_pin: Peri<'static, hal::peripherals::PB13>,
) -> ! {
    let mut config = UartConfig::default();
    config.baudrate = UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let uart = BufferedUart::new_with_rtscts(
        usart,
        rx_pin,
        tx_pin,
        rts_pin,
        cts_pin,
        UartIrqs,
        UART_TX_BUFFER.init([0; TX_QUEUE_DEPTH]),
        UART_RX_BUFFER.init([0; RX_QUEUE_DEPTH]),
        config,
    )
    .expect("failed to initialize link UART");

    let (mut uart_tx, mut uart_rx) = uart.split();
    let outbound = queues.tx_receiver();
    let inbound = queues.rx_sender();

    let transmit = async move {
        let mut burst = [0u8; TX_BURST];
        loop {
            burst[0] = outbound.receive().await;
            let mut len = 1;
            while len < TX_BURST {
                match outbound.try_receive() {
                    Ok(byte) => {
                        burst[len] = byte;
                        len += 1;
                    }
                    Err(_) => break,
                }
            }

            // Blocks while the peer holds CTS; the bridge sees the queue fill up.
            if uart_tx.write_all(&burst[..len]).await.is_err() {
                status::record_uart_error();
                defmt::warn!("link: UART write error, {} bytes lost", len);
                Timer::after(Duration::from_millis(5)).await;
            }
        }
    };

    let receive = async move {
        let mut ingress = [0u8; 32];
        loop {
            match uart_rx.read(&mut ingress).await {
                Ok(count) => {
                    for &byte in &ingress[..count] {
                        inbound.send(byte).await;
                    }
                }
                Err(_) => {
                    status::record_uart_error();
                    defmt::warn!("link: UART read error");
                    Timer::after(Duration::from_millis(5)).await;
                }
            }
        }
    };

    join(transmit, receive).await;
    loop {
        core::future::pending::<()>().await;
    }
}
