use bincode::{deserialize, serialize};
use clap::Parser;
use shared::{Packet, Phase, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout, Instant};

/// Joins a running server, backs a racer and taps through one click window
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Racer to back
    #[clap(short, long, default_value = "gecko-1")]
    racer: String,
    /// Taps to send during the click window
    #[clap(short, long, default_value = "20")]
    taps: u32,
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    server_addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, server_addr).await?;
    Ok(())
}

async fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Option<Packet> {
    match timeout(Duration::from_secs(1), socket.recv_from(buf)).await {
        Ok(Ok((len, _))) => deserialize::<Packet>(&buf[0..len]).ok(),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);
    let server_addr = args.server.parse::<SocketAddr>()?;

    let join = Packet::Join {
        client_version: PROTOCOL_VERSION,
        player_id: None,
        nickname: Some("Test Client".to_string()),
    };
    println!("Joining {}", server_addr);
    send(&socket, &join, server_addr).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut joined = false;
    let mut tapped = false;
    let mut last_heartbeat = Instant::now();

    loop {
        if last_heartbeat.elapsed() >= Duration::from_secs(1) {
            send(&socket, &Packet::Heartbeat, server_addr).await?;
            last_heartbeat = Instant::now();
        }

        let Some(packet) = recv(&socket, &mut buf).await else {
            continue;
        };

        match packet {
            Packet::Welcome {
                player_id,
                nickname,
                referral_code,
                ..
            } => {
                println!(
                    "Joined as {} ({}), referral code {:?}",
                    nickname, player_id, referral_code
                );
                joined = true;
                let select = Packet::SelectRacer {
                    racer_id: args.racer.clone(),
                };
                send(&socket, &select, server_addr).await?;
            }
            Packet::Rejected { reason } => {
                println!("Rejected: {}", reason);
                break;
            }
            Packet::ActionResult { action, success } => {
                println!("{:?}: {}", action, if success { "ok" } else { "refused" });
            }
            Packet::State(state) if joined => {
                let snapshot = &state.snapshot;
                match snapshot.phase {
                    Phase::ClickWindow if !tapped => {
                        tapped = true;
                        println!("Click window open, sending {} taps", args.taps);
                        for _ in 0..args.taps {
                            let boost = Packet::Boost {
                                racer_id: args.racer.clone(),
                            };
                            send(&socket, &boost, server_addr).await?;
                            sleep(Duration::from_millis(20)).await;
                        }
                    }
                    Phase::Results if tapped => {
                        if let Some(results) = &snapshot.race_results {
                            for result in results {
                                println!(
                                    "  #{} {} - {} taps, {} backers",
                                    result.rank,
                                    result.racer_name,
                                    result.total_taps,
                                    result.participants
                                );
                            }
                        }
                        send(&socket, &Packet::RequestResult, server_addr).await?;
                    }
                    _ => {}
                }
            }
            Packet::BoostResult(result) => {
                if let Some(reason) = result.reason {
                    println!("Boost refused: {}", reason);
                }
            }
            Packet::PlayerResult(result) => {
                match result {
                    Some(result) => println!(
                        "Finished #{} with {} of {} taps, earned {}",
                        result.rank, result.my_taps, result.total_taps, result.prize_earned
                    ),
                    None => println!("No result for this round"),
                }
                break;
            }
            _ => {}
        }
    }

    println!("Sending leave");
    send(&socket, &Packet::Leave, server_addr).await?;
    println!("Test client finished");

    Ok(())
}
