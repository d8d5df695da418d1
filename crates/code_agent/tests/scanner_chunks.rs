use code_agent::scanner::{ScanOutput, Scanner};
use code_agent::CodeBlock;
use code_atlas::{push_styled, StyledSegment};
use pretty_assertions::assert_eq;

const TRANSCRIPT: &str = "# Plan\n\
Run **this** and *that* with `ls -la` first.\n\
```python\n\
print('a`b')\n\
```\n\
## Then\n\
```PowerShell script\n\
Write-Host \"hi\"\n\
```\n\
```text\n\
not run\n\
```\n\
#hashtag and __done__\n";

fn scan(chunks: &[&str]) -> (Vec<StyledSegment>, Vec<CodeBlock>) {
    let mut scanner = Scanner::new();
    let mut outputs: Vec<ScanOutput> = Vec::new();
    for chunk in chunks {
        outputs.push(scanner.feed(chunk));
    }

    let mut segments = Vec::new();
    let mut blocks = Vec::new();
    for output in outputs {
        for segment in output.segments {
            push_styled(&mut segments, &segment.text, &segment.style);
        }
        blocks.extend(output.blocks);
    }
    (segments, blocks)
}

#[test]
fn transcript_yields_the_runnable_blocks() {
    let (_, blocks) = scan(&[TRANSCRIPT]);
    assert_eq!(
        blocks,
        vec![
            CodeBlock::new("print('a`b')\n", "python"),
            CodeBlock::new("Write-Host \"hi\"\n", "powershell"),
        ]
    );
}

#[test]
fn every_two_way_split_matches_the_whole_transcript() {
    let whole = scan(&[TRANSCRIPT]);
    for (index, _) in TRANSCRIPT.char_indices().skip(1) {
        let (head, tail) = TRANSCRIPT.split_at(index);
        assert_eq!(scan(&[head, tail]), whole, "split at byte {index}");
    }
}

#[test]
fn one_character_chunks_match_the_whole_transcript() {
    let chars: Vec<String> = TRANSCRIPT.chars().map(String::from).collect();
    let chunks: Vec<&str> = chars.iter().map(String::as_str).collect();
    assert_eq!(scan(&chunks), scan(&[TRANSCRIPT]));
}
