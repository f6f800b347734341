use clap::{arg,crate_version,Command};
use std::path::{Path,PathBuf};
use entropycoder::{huffman,rice,sfe,arith,predictive,transform,pgm,STDRESULT};

const RCH: &str = "unreachable was reached";

/// relative frequencies of the distinct bytes, in first-occurrence order
fn frequency_table(message: &[u8]) -> Vec<(u8,f64)> {
    rice::distinct_symbols(message).iter().map(|symbol| {
        let count = message.iter().filter(|s| *s == symbol).count();
        (*symbol,count as f64 / message.len() as f64)
    }).collect()
}

fn refuse_overwrite(path: &Path) -> STDRESULT {
    match path.exists() {
        true => {
            eprintln!("{} already exists",path.display());
            Err(Box::new(std::fmt::Error))
        },
        false => Ok(())
    }
}

fn encode(code: &str,filename: &Path) -> STDRESULT {
    let message = std::fs::read(filename)?;
    let packaged: Vec<u8> = match code {
        "huffman" | "h" => {
            huffman::TreeBasedCodec::from_message(&message)?.serialize(&message)?
        },
        "shannon-fano-elias" | "sfe" => {
            let codec = sfe::SfeCodec::new(&frequency_table(&message),sfe::Model::Iid,false)?;
            codec.serialize(&message)?
        },
        "rice" | "r" => {
            let alphabet = rice::distinct_symbols(&message);
            let (codec,_) = rice::RiceCodec::auto_encode(&message,alphabet,5)?;
            log::debug!("auto-selected rice parameter {}",codec.rice_param());
            codec.serialize(&message)?
        },
        "arithmetic" | "ac" => {
            let alphabet = rice::distinct_symbols(&message);
            arith::AdaptiveArithmeticCodec::new(alphabet,false,16,16)?.serialize(&message)?
        },
        "predictive" | "p" => {
            let image = pgm::read_pgm(&message)?;
            let codec = predictive::PredictiveImageCodec::new(
                predictive::Predictor::LeftAboveAverage,image.width,image.height);
            codec.serialize(&image)?
        },
        "transform" | "t" => {
            let image = pgm::read_pgm(&message)?;
            let codec = transform::TransformImageCodec::new(
                image.width,image.height,transform::DEFAULT_QUANT_STEP)?;
            codec.serialize(&image)?
        },
        _ => {
            eprintln!("{} not supported",code);
            return Err(Box::new(std::fmt::Error));
        }
    };
    let mut out_name = filename.as_os_str().to_owned();
    out_name.push(".enc");
    let out_path = PathBuf::from(out_name);
    refuse_overwrite(&out_path)?;
    std::fs::write(&out_path,packaged)?;
    Ok(())
}

fn decode(code: &str,filename: &Path) -> STDRESULT {
    if filename.extension().map(|e| e.to_string_lossy().to_string()) != Some("enc".to_string()) {
        eprintln!("the encoded file extension must be \".enc\"");
        return Err(Box::new(std::fmt::Error));
    }
    let inner = filename.with_extension("");
    let mut out_name = match inner.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => {
            eprintln!("cannot name the output for {}",filename.display());
            return Err(Box::new(std::fmt::Error));
        }
    };
    out_name.push_str("_dec");
    if let Some(ext) = inner.extension() {
        out_name.push('.');
        out_name.push_str(&ext.to_string_lossy());
    }
    let out_path = inner.with_file_name(out_name);
    refuse_overwrite(&out_path)?;
    let byte_stream = std::fs::read(filename)?;
    let decoded: Vec<u8> = match code {
        "huffman" | "h" => huffman::TreeBasedCodec::decode_byte_stream(&byte_stream)?,
        "shannon-fano-elias" | "sfe" => sfe::SfeCodec::decode_byte_stream(&byte_stream)?,
        "rice" | "r" => rice::RiceCodec::decode_byte_stream(&byte_stream)?,
        "arithmetic" | "ac" => arith::AdaptiveArithmeticCodec::decode_byte_stream(&byte_stream)?,
        "predictive" | "p" => pgm::write_pgm(&predictive::PredictiveImageCodec::decode_byte_stream(&byte_stream)?),
        "transform" | "t" => pgm::write_pgm(&transform::TransformImageCodec::decode_byte_stream(&byte_stream)?),
        _ => {
            eprintln!("{} not supported",code);
            return Err(Box::new(std::fmt::Error));
        }
    };
    std::fs::write(&out_path,decoded)?;
    Ok(())
}

fn main() -> STDRESULT {
    env_logger::init();
    let long_help =
"Examples:
---------
Encode:   `entropycoder huffman encode notes.txt` writes notes.txt.enc
Decode:   `entropycoder huffman decode notes.txt.enc` writes notes_dec.txt
Images:   `entropycoder predictive encode photo.pgm` (binary PGM only)";

    let codes = [
        "huffman","h",
        "shannon-fano-elias","sfe",
        "rice","r",
        "arithmetic","ac",
        "predictive","p",
        "transform","t"
    ];

    let main_cmd = Command::new("entropycoder")
        .about("Encode and decode with entropy and predictive codecs")
        .after_long_help(long_help)
        .version(crate_version!())
        .arg(arg!(<code> "code to use").value_parser(codes))
        .arg(arg!(<action> "encode or decode").value_parser(["encode","decode"]))
        .arg(arg!(<filename> "path to the file to be processed"));

    let matches = main_cmd.get_matches();
    let code = matches.get_one::<String>("code").expect(RCH);
    let action = matches.get_one::<String>("action").expect(RCH);
    let filename = PathBuf::from(matches.get_one::<String>("filename").expect(RCH));

    match action.as_str() {
        "encode" => encode(code,&filename),
        _ => decode(code,&filename)
    }
}
